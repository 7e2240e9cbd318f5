//! Advisory feed orchestration
//!
//! An updater produces the vulnerability records for one external source.
//! The driver runs each updater under a distributed lock: read the prior
//! fingerprint, fetch conditionally (an unchanged source is a no-op),
//! parse, and apply to the store atomically with the new fingerprint.
//! Sources that publish a change index get a differential path that only
//! fetches deltas.

mod csaf;
mod driver;
mod factory;
mod fingerprint;
mod http;
mod secdb;

pub use csaf::{parse_changes_csv, parse_deletions_csv, CsafUpdater, FINGERPRINT_VERSION};
pub use driver::{UpdateDriver, UpdateOptions, UpdaterStatus};
pub use factory::{ReleaseStreamFactory, UpdaterSetFactory};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use http::{Fetched, HttpFetcher};
pub use secdb::SecdbUpdater;

use anyhow::Result;
use async_trait::async_trait;
use layerbom_core::{Severity, Vulnerability};
use serde::Deserialize;

/// One advisory source.
///
/// `fetch` must honor the fingerprint contract: given the previous opaque
/// fingerprint it either reports the source unchanged or returns the new
/// body and fingerprint. `parse` turns a fetched body into normalized
/// records; a parse failure is fatal for the run and must not advance the
/// fingerprint.
#[async_trait]
pub trait Updater: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, prev_fingerprint: &str) -> Result<Fetched>;
    async fn parse(&self, body: &[u8]) -> Result<Vec<Vulnerability>>;
}

/// Outcome of a differential refresh.
pub enum Delta {
    Unchanged,
    Changed {
        added: Vec<Vulnerability>,
        deleted: Vec<String>,
        fingerprint: String,
    },
}

/// An advisory source with a change index: fetches only what moved since
/// the cursor in the previous fingerprint.
#[async_trait]
pub trait DeltaUpdater: Send + Sync {
    fn name(&self) -> &str;
    async fn delta(&self, prev_fingerprint: &str) -> Result<Delta>;
}

/// A normalized advisory document: the reduced form every feed parser
/// produces. Records in an `unaffected`/`none` state are dropped at
/// conversion; vendor severity strings normalize onto the five-level
/// scale.
#[derive(Debug, Deserialize)]
pub struct RawAdvisory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub issued: String,
    #[serde(default)]
    pub links: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub package: Option<layerbom_core::Package>,
    #[serde(default)]
    pub dist: Option<layerbom_core::Distribution>,
    #[serde(default)]
    pub repo: Option<layerbom_core::Repository>,
    #[serde(default)]
    pub fixed_in_version: String,
    #[serde(default)]
    pub arch_operation: layerbom_core::ArchOp,
}

/// Convert raw advisories, dropping non-affecting definitions.
pub fn convert_advisories(raw: Vec<RawAdvisory>) -> Vec<Vulnerability> {
    raw.into_iter()
        .filter(|r| !matches!(r.state.as_str(), "unaffected" | "none"))
        .map(|r| Vulnerability {
            id: String::new(),
            updater: String::new(),
            name: r.name,
            description: r.description,
            issued: r.issued,
            links: r.links,
            normalized_severity: Severity::from_vendor(&r.severity),
            severity: r.severity,
            package: r.package,
            dist: r.dist,
            repo: r.repo,
            fixed_in_version: r.fixed_in_version,
            arch_operation: r.arch_operation,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_drops_unaffected_and_normalizes() {
        let raw = serde_json::from_str::<Vec<RawAdvisory>>(
            r#"[
                {"name": "CVE-1", "severity": "Important", "state": "affected"},
                {"name": "CVE-2", "severity": "Moderate", "state": "unaffected"},
                {"name": "CVE-3", "state": "none"},
                {"name": "CVE-4", "severity": "bogus"}
            ]"#,
        )
        .unwrap();
        let vulns = convert_advisories(raw);
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].name, "CVE-1");
        assert_eq!(vulns[0].normalized_severity, Severity::High);
        assert_eq!(vulns[1].normalized_severity, Severity::Unknown);
    }
}
