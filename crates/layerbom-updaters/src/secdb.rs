//! secdb-style branch feeds
//!
//! The simplest feed family: one JSON document per distribution branch,
//! mapping package names to the versions that fixed each CVE. The format
//! carries no severities, so every record normalizes to Unknown.

use crate::http::{Fetched, HttpFetcher};
use crate::Updater;
use anyhow::{Context, Result};
use async_trait::async_trait;
use layerbom_core::{Package, Vulnerability};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct SecDb {
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    pkg: PkgFixes,
}

#[derive(Debug, Deserialize)]
struct PkgFixes {
    name: String,
    /// fixed version -> CVE ids. A version of "0" marks unresolved
    /// advisories.
    #[serde(default)]
    secfixes: BTreeMap<String, Vec<String>>,
}

/// Updater for one secdb branch document.
pub struct SecdbUpdater {
    name: String,
    fetcher: HttpFetcher,
    dist: Option<layerbom_core::Distribution>,
}

impl SecdbUpdater {
    pub fn new(name: impl Into<String>, client: reqwest::Client, url: impl Into<String>) -> Self {
        SecdbUpdater {
            name: name.into(),
            fetcher: HttpFetcher::new(client, url),
            dist: None,
        }
    }

    /// Stamp every parsed record with this distribution template, so
    /// matchers can scope candidates to the branch the stream covers.
    pub fn with_distribution(mut self, dist: layerbom_core::Distribution) -> Self {
        self.dist = Some(dist);
        self
    }
}

#[async_trait]
impl Updater for SecdbUpdater {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, prev_fingerprint: &str) -> Result<Fetched> {
        self.fetcher.fetch(prev_fingerprint).await
    }

    async fn parse(&self, body: &[u8]) -> Result<Vec<Vulnerability>> {
        let db: SecDb = serde_json::from_slice(body).context("decoding secdb document")?;
        let mut vulns = Vec::new();
        for entry in db.packages {
            for (version, cves) in &entry.pkg.secfixes {
                for cve in cves {
                    vulns.push(Vulnerability {
                        name: cve.clone(),
                        package: Some(Package {
                            name: entry.pkg.name.clone(),
                            ..Default::default()
                        }),
                        dist: self.dist.clone(),
                        fixed_in_version: if version == "0" {
                            String::new()
                        } else {
                            version.clone()
                        },
                        ..Default::default()
                    });
                }
            }
        }
        Ok(vulns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::Severity;

    const SAMPLE: &str = r#"{
        "distroversion": "v3.19",
        "packages": [
            {"pkg": {"name": "openssl", "secfixes": {
                "3.1.4-r5": ["CVE-2024-0727"],
                "0": ["CVE-2024-9999"]
            }}},
            {"pkg": {"name": "busybox", "secfixes": {}}}
        ]
    }"#;

    #[tokio::test]
    async fn test_parse_secfixes() {
        let updater = SecdbUpdater::new("secdb-v3.19", reqwest::Client::new(), "http://unused");
        let vulns = updater.parse(SAMPLE.as_bytes()).await.unwrap();
        assert_eq!(vulns.len(), 2);

        let unfixed = vulns.iter().find(|v| v.name == "CVE-2024-9999").unwrap();
        assert!(unfixed.fixed_in_version.is_empty());
        let fixed = vulns.iter().find(|v| v.name == "CVE-2024-0727").unwrap();
        assert_eq!(fixed.fixed_in_version, "3.1.4-r5");
        assert_eq!(fixed.normalized_severity, Severity::Unknown);
        assert_eq!(fixed.package.as_ref().unwrap().name, "openssl");
    }

    #[tokio::test]
    async fn test_parse_rejects_malformed_document() {
        let updater = SecdbUpdater::new("secdb", reqwest::Client::new(), "http://unused");
        assert!(updater.parse(b"{not json").await.is_err());
    }
}
