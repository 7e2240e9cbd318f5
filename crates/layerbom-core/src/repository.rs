//! Repository records

use serde::{Deserialize, Serialize};

/// A software repository a package may have been installed from.
///
/// `key` namespaces `name`: the same `name` under different keys (an
/// OS-vendor CPE repository vs. an ecosystem registry, say) is two
/// different repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// CPE in formatted-string binding, empty when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,
}

impl Repository {
    /// Identity before the store assigns an id.
    pub fn similarity_key(&self) -> String {
        format!("{}\u{0}{}", self.name, self.key)
    }
}
