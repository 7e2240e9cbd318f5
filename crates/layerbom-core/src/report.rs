//! Index and vulnerability reports

use crate::digest::Digest;
use crate::distribution::Distribution;
use crate::environment::Environment;
use crate::package::Package;
use crate::repository::Repository;
use crate::vulnerability::Vulnerability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Controller states. Serializes to the stable variant name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexState {
    Terminal,
    #[default]
    CheckManifest,
    FetchLayers,
    ScanLayers,
    Coalesce,
    IndexManifest,
    IndexError,
    IndexFinished,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Terminal => "Terminal",
            IndexState::CheckManifest => "CheckManifest",
            IndexState::FetchLayers => "FetchLayers",
            IndexState::ScanLayers => "ScanLayers",
            IndexState::Coalesce => "Coalesce",
            IndexState::IndexManifest => "IndexManifest",
            IndexState::IndexError => "IndexError",
            IndexState::IndexFinished => "IndexFinished",
        };
        f.write_str(s)
    }
}

/// The consolidated inventory of one manifest.
///
/// Mutated by the controller's state functions and persisted at every
/// transition; on failure `success` is false, `err` carries the message,
/// and the maps may be partially populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub manifest: Digest,
    pub state: IndexState,
    #[serde(default)]
    pub packages: HashMap<String, Package>,
    #[serde(default)]
    pub distributions: HashMap<String, Distribution>,
    #[serde(default)]
    pub repositories: HashMap<String, Repository>,
    /// Keyed by package id; every key also appears in `packages`.
    #[serde(default)]
    pub environments: HashMap<String, Vec<Environment>>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl IndexReport {
    pub fn new(manifest: Digest) -> Self {
        IndexReport {
            manifest,
            state: IndexState::CheckManifest,
            packages: HashMap::new(),
            distributions: HashMap::new(),
            repositories: HashMap::new(),
            environments: HashMap::new(),
            success: false,
            err: String::new(),
        }
    }

    /// Merge another report's entities into this one. Environments append;
    /// entity maps take the first definition of an id.
    pub fn merge(&mut self, other: IndexReport) {
        for (id, p) in other.packages {
            self.packages.entry(id).or_insert(p);
        }
        for (id, d) in other.distributions {
            self.distributions.entry(id).or_insert(d);
        }
        for (id, r) in other.repositories {
            self.repositories.entry(id).or_insert(r);
        }
        for (id, mut envs) in other.environments {
            self.environments.entry(id).or_default().append(&mut envs);
        }
    }
}

/// The output of the matching core: the originating index report's fields
/// verbatim, plus the vulnerability correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub manifest: Digest,
    #[serde(default)]
    pub packages: HashMap<String, Package>,
    #[serde(default)]
    pub distributions: HashMap<String, Distribution>,
    #[serde(default)]
    pub repositories: HashMap<String, Repository>,
    #[serde(default)]
    pub environments: HashMap<String, Vec<Environment>>,
    #[serde(default)]
    pub vulnerabilities: HashMap<String, Vulnerability>,
    /// Package id → ordered vulnerability ids, in match order.
    #[serde(default)]
    pub package_vulnerabilities: HashMap<String, Vec<String>>,
}

impl VulnerabilityReport {
    /// Start a vulnerability report from a finished index report.
    pub fn from_index_report(report: &IndexReport) -> Self {
        VulnerabilityReport {
            manifest: report.manifest.clone(),
            packages: report.packages.clone(),
            distributions: report.distributions.clone(),
            repositories: report.repositories.clone(),
            environments: report.environments.clone(),
            vulnerabilities: HashMap::new(),
            package_vulnerabilities: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_to_stable_name() {
        let json = serde_json::to_string(&IndexState::CheckManifest).unwrap();
        assert_eq!(json, "\"CheckManifest\"");
        let json = serde_json::to_string(&IndexState::IndexError).unwrap();
        assert_eq!(json, "\"IndexError\"");
        let back: IndexState = serde_json::from_str("\"IndexFinished\"").unwrap();
        assert_eq!(back, IndexState::IndexFinished);
    }

    #[test]
    fn test_merge_appends_environments() {
        let digest = Digest::sha256_of(b"m");
        let mut a = IndexReport::new(digest.clone());
        a.packages.insert("1".into(), Package::default());
        a.environments.insert(
            "1".into(),
            vec![Environment {
                package_db: "db-a".into(),
                introduced_in: Digest::sha256_of(b"l1"),
                distribution_id: String::new(),
                repository_ids: vec![],
            }],
        );

        let mut b = IndexReport::new(digest);
        b.environments.insert(
            "1".into(),
            vec![Environment {
                package_db: "db-b".into(),
                introduced_in: Digest::sha256_of(b"l2"),
                distribution_id: String::new(),
                repository_ids: vec![],
            }],
        );

        a.merge(b);
        assert_eq!(a.environments["1"].len(), 2);
    }

    #[test]
    fn test_report_roundtrip() {
        let mut r = IndexReport::new(Digest::sha256_of(b"m"));
        r.state = IndexState::IndexFinished;
        r.success = true;
        let json = serde_json::to_string(&r).unwrap();
        let back: IndexReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, IndexState::IndexFinished);
        assert!(back.success);
        assert_eq!(back.manifest, r.manifest);
    }
}
