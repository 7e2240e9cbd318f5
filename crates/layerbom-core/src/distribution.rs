//! Distribution records and the process-wide memo table
//!
//! Consumers hold `Arc<Distribution>` handles; the memo table guarantees
//! that equal normalized version tags share one allocation, so two layers
//! reporting the same release resolve to pointer-equal distributions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// One operating-system release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(default)]
    pub id: String,
    /// Lower-case distribution identifier, `ID=` from os-release.
    pub did: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pretty_name: String,
    /// CPE in formatted-string binding, empty when the release carries none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,
}

/// Load-or-store memo table keyed by normalized version tag.
#[derive(Debug, Default)]
pub struct DistributionCache {
    inner: Mutex<HashMap<String, Arc<Distribution>>>,
}

impl DistributionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized distribution for `tag`, building it with `make`
    /// on first sight. Later calls with the same tag return the same
    /// allocation even if `make` would now produce something different.
    pub fn load_or_store<F>(&self, tag: &str, make: F) -> Arc<Distribution>
    where
        F: FnOnce() -> Distribution,
    {
        let mut inner = self.inner.lock().expect("distribution cache poisoned");
        inner
            .entry(tag.to_string())
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Process-wide memo, for callers without a cache of their own.
pub fn distribution_for<F>(tag: &str, make: F) -> Arc<Distribution>
where
    F: FnOnce() -> Distribution,
{
    static GLOBAL: OnceLock<DistributionCache> = OnceLock::new();
    GLOBAL.get_or_init(DistributionCache::new).load_or_store(tag, make)
}
