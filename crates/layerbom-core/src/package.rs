//! Package records

use serde::{Deserialize, Serialize};

/// Whether a package is an installed binary or the source it was built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[default]
    Binary,
    Source,
}

/// One installed package as reported by a detector.
///
/// `id` is assigned by the store; before storage, identity is the
/// `(name, version, kind, arch, module, package_db)` tuple. A binary
/// package may reference at most one source package, by id, through the
/// report's package map; the reference is never an owning edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub kind: PackageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package_db: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    /// Id of the source package in the report's package map, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Opaque `key=value&…` query string carrying ecosystem-specific
    /// context, e.g. `repoid=rhel-8-baseos`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository_hint: String,
}

impl Package {
    /// Identity used to dedupe packages before the store assigns ids.
    pub fn similarity_key(&self) -> String {
        format!(
            "{}\u{0}{}\u{0}{:?}\u{0}{}\u{0}{}\u{0}{}",
            self.name, self.version, self.kind, self.arch, self.module, self.package_db
        )
    }

    /// Read a single key from the repository hint string.
    pub fn hint_get(&self, key: &str) -> Option<&str> {
        self.repository_hint.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// Set or replace a key in the repository hint string, preserving the
    /// other entries.
    pub fn hint_set(&mut self, key: &str, value: &str) {
        let mut pairs: Vec<String> = self
            .repository_hint
            .split('&')
            .filter(|p| !p.is_empty() && p.split_once('=').map(|(k, _)| k) != Some(key))
            .map(str::to_string)
            .collect();
        pairs.push(format!("{key}={value}"));
        self.repository_hint = pairs.join("&");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_ignores_id_and_hint() {
        let mut a = Package {
            name: "bash".into(),
            version: "4.4.19-12.el8".into(),
            arch: "x86_64".into(),
            package_db: "var/lib/rpm".into(),
            ..Default::default()
        };
        let mut b = a.clone();
        a.id = "1".into();
        b.id = "2".into();
        b.repository_hint = "repoid=baseos".into();
        assert_eq!(a.similarity_key(), b.similarity_key());
    }

    #[test]
    fn test_hint_set_and_get() {
        let mut p = Package::default();
        p.hint_set("repoid", "rhel-8-baseos");
        assert_eq!(p.hint_get("repoid"), Some("rhel-8-baseos"));

        p.hint_set("key", "cpe-repo");
        p.hint_set("repoid", "rhel-8-appstream");
        assert_eq!(p.hint_get("repoid"), Some("rhel-8-appstream"));
        assert_eq!(p.hint_get("key"), Some("cpe-repo"));
        assert_eq!(p.hint_get("missing"), None);
    }
}
