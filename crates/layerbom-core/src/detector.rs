//! Detector identity
//!
//! A detector is identified by `(name, version, kind)`. The store keys its
//! per-layer memoization and manifest completion marks on these, so the
//! identity types live with the data model rather than the scanner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The artifact kind a detector produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Package,
    Distribution,
    Repository,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Package => "package",
            DetectorKind::Distribution => "distribution",
            DetectorKind::Repository => "repository",
        }
    }
}

/// Identity of one detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectorInfo {
    pub name: String,
    pub version: String,
    pub kind: DetectorKind,
}

impl DetectorInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: DetectorKind) -> Self {
        DetectorInfo {
            name: name.into(),
            version: version.into(),
            kind,
        }
    }
}

impl fmt::Display for DetectorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.version, self.kind)
    }
}
