//! Normalized vulnerability records

use crate::distribution::Distribution;
use crate::package::Package;
use crate::repository::Repository;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// How a vulnerability's architecture constraint is applied to a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchOp {
    /// No architecture constraint.
    #[default]
    None,
    /// Record and vulnerability architecture must be equal.
    Equals,
    /// The vulnerability architecture is a pattern the record architecture
    /// must match.
    Pattern,
}

/// One advisory record as produced by an updater.
///
/// The package, distribution, and repository fields are templates: they
/// describe what an affected record looks like, not a concrete sighting.
/// Records are replaced wholesale per updater run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub id: String,
    /// Name of the updater that produced this record.
    pub updater: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// RFC3339 issue date, empty when the feed does not carry one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issued: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub links: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
    #[serde(default)]
    pub normalized_severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Distribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<Repository>,
    /// Version the fix shipped in; empty means no fix is available.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fixed_in_version: String,
    #[serde(default)]
    pub arch_operation: ArchOp,
}

impl Vulnerability {
    /// Whether a fix version is recorded.
    pub fn fixed(&self) -> bool {
        !self.fixed_in_version.is_empty()
    }
}
