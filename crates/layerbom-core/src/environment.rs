//! Environment records

use crate::digest::Digest;
use serde::{Deserialize, Serialize};

/// Where a surviving package was observed.
///
/// Reachable from exactly one package id in the report; `introduced_in`
/// always names a digest belonging to the report's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_db: String,
    pub introduced_in: Digest,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub distribution_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repository_ids: Vec<String>,
}
