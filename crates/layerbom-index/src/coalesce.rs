//! Coalescing per-layer artifacts into an image inventory
//!
//! The policy assumes union-filesystem semantics: any change to a package
//! database rewrites the database file wholesale, so the newest layer
//! touching a database is authoritative for it. Distributions propagate
//! forward (an empty-distribution layer inherits the most recent one),
//! repositories accumulate across all layers.

use crate::dnf::HistoryDb;
use anyhow::Result;
use async_trait::async_trait;
use layerbom_core::{Digest, Distribution, Environment, IndexReport, Layer, Package, Repository};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Per-layer, kind-partitioned artifacts in manifest order.
pub struct LayerArtifacts {
    pub digest: Digest,
    /// Realized layer handle, when the run fetched this layer. Used for
    /// DNF history lookups; coalescing itself never needs it, since a
    /// shared base layer may have been scanned by an earlier manifest and
    /// never refetched.
    pub layer: Option<Layer>,
    pub packages: Vec<Package>,
    /// Package-database paths recorded for this layer at scan time,
    /// whether or not any packages survive in them.
    pub databases: Vec<String>,
    pub distributions: Vec<Distribution>,
    pub repositories: Vec<Repository>,
}

/// Per-request coalescer knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoalesceOptions {
    /// Rewrite package repository hints with `repoid=` entries from an
    /// on-layer DNF history database, when one is present.
    pub annotate_repoids: bool,
}

/// Per-ecosystem reduction from layer artifacts to an index report.
#[async_trait]
pub trait Coalescer: Send + Sync {
    async fn coalesce(
        &self,
        manifest: &Digest,
        layers: &[LayerArtifacts],
        opts: &CoalesceOptions,
    ) -> Result<IndexReport>;
}

/// The coalescer for conventional Linux package databases.
#[derive(Debug, Default)]
pub struct LinuxCoalescer {
    dnf_capable: bool,
}

impl LinuxCoalescer {
    pub fn new() -> Self {
        LinuxCoalescer { dnf_capable: false }
    }

    /// A coalescer that augments repository hints from DNF transaction
    /// history when the request opts in.
    pub fn with_dnf_annotation() -> Self {
        LinuxCoalescer { dnf_capable: true }
    }
}

#[async_trait]
impl Coalescer for LinuxCoalescer {
    async fn coalesce(
        &self,
        manifest: &Digest,
        layers: &[LayerArtifacts],
        opts: &CoalesceOptions,
    ) -> Result<IndexReport> {
        let mut report = IndexReport::new(manifest.clone());

        // Repository accumulation: first sighting of a (name, key) wins,
        // the CPE field propagates from whichever sighting carries it.
        let mut repo_ids: HashMap<String, String> = HashMap::new();
        let mut layer_repo_ids: Vec<Vec<String>> = Vec::with_capacity(layers.len());
        for la in layers {
            let mut here = Vec::new();
            for r in &la.repositories {
                let id = match repo_ids.get(&r.similarity_key()) {
                    Some(id) => {
                        let known = report.repositories.get_mut(id);
                        if let Some(known) = known {
                            if known.cpe.is_empty() && !r.cpe.is_empty() {
                                known.cpe = r.cpe.clone();
                            }
                        }
                        id.clone()
                    }
                    None => {
                        repo_ids.insert(r.similarity_key(), r.id.clone());
                        report.repositories.insert(r.id.clone(), r.clone());
                        r.id.clone()
                    }
                };
                if !here.contains(&id) {
                    here.push(id);
                }
            }
            layer_repo_ids.push(here);
        }

        // Distribution inheritance: the current distribution is the most
        // recently observed non-empty one; later sightings replace it.
        let mut current: Option<Distribution> = None;
        let mut dist_by_layer: Vec<Option<Distribution>> = Vec::with_capacity(layers.len());
        for la in layers {
            if let Some(d) = la.distributions.first() {
                if la.distributions.len() > 1 {
                    debug!(
                        "layer {} reports {} distributions; using the first",
                        la.digest,
                        la.distributions.len()
                    );
                }
                current = Some(d.clone());
                report.distributions.entry(d.id.clone()).or_insert_with(|| d.clone());
            }
            dist_by_layer.push(current.clone());
        }

        // Stage: the layer where each (db, package) was first seen.
        let mut first_seen: HashMap<(String, String), usize> = HashMap::new();
        for (i, la) in layers.iter().enumerate() {
            for p in &la.packages {
                first_seen
                    .entry((p.package_db.clone(), p.similarity_key()))
                    .or_insert(i);
            }
        }

        // Newest-db-wins: walking in reverse, the first layer presenting a
        // database is authoritative for it. Presence is the recorded
        // database set, so a layer that rewrote a database with no
        // surviving packages still seals it, contributing nothing.
        let mut sealed: HashSet<String> = HashSet::new();
        let mut authoritative: Vec<(String, &Package)> = Vec::new();
        for la in layers.iter().rev() {
            let mut dbs_here: Vec<&str> = la.databases.iter().map(String::as_str).collect();
            for p in &la.packages {
                if !dbs_here.contains(&p.package_db.as_str()) {
                    dbs_here.push(&p.package_db);
                }
            }
            for db in dbs_here {
                if !sealed.insert(db.to_string()) {
                    continue;
                }
                let before = authoritative.len();
                for p in la.packages.iter().filter(|p| p.package_db == db) {
                    authoritative.push((db.to_string(), p));
                }
                if authoritative.len() == before {
                    debug!(
                        "layer {} rewrote {} with no surviving packages",
                        la.digest, db
                    );
                }
            }
        }

        // Emit the surviving packages with their environments.
        for (db, p) in authoritative {
            let idx = first_seen[&(db.clone(), p.similarity_key())];
            let env = Environment {
                package_db: db,
                introduced_in: layers[idx].digest.clone(),
                distribution_id: dist_by_layer[idx]
                    .as_ref()
                    .map(|d| d.id.clone())
                    .unwrap_or_default(),
                repository_ids: layer_repo_ids[idx].clone(),
            };
            report.packages.insert(p.id.clone(), p.clone());
            report.environments.entry(p.id.clone()).or_default().push(env);
        }

        if self.dnf_capable && opts.annotate_repoids {
            annotate_repoids(&mut report, layers)?;
        }

        Ok(report)
    }
}

/// Rewrite `repoid=` hints from the newest on-layer DNF history database.
///
/// A repo-id with no corresponding discovered repository stays in the hint
/// string but produces no environment link.
fn annotate_repoids(report: &mut IndexReport, layers: &[LayerArtifacts]) -> Result<()> {
    let mut history = None;
    for la in layers.iter().rev() {
        if let Some(layer) = &la.layer {
            if let Some(db) = HistoryDb::open_on_layer(layer)? {
                history = Some(db);
                break;
            }
        }
    }
    let Some(history) = history else {
        return Ok(());
    };

    let repo_id_by_name: HashMap<String, String> = report
        .repositories
        .values()
        .map(|r| (r.name.clone(), r.id.clone()))
        .collect();

    for (id, package) in report.packages.iter_mut() {
        let repoid = match history.repoid_for(package) {
            Ok(Some(repoid)) => repoid,
            Ok(None) => continue,
            Err(e) => {
                warn!("dnf history lookup failed for {}: {e}", package.name);
                continue;
            }
        };
        package.hint_set("repoid", &repoid);
        if let Some(repo_id) = repo_id_by_name.get(&repoid) {
            if let Some(envs) = report.environments.get_mut(id) {
                for env in envs {
                    if !env.repository_ids.contains(repo_id) {
                        env.repository_ids.push(repo_id.clone());
                    }
                }
            }
        }
    }
    history.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str, name: &str, version: &str, db: &str) -> Package {
        Package {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            arch: "x86_64".into(),
            package_db: db.into(),
            ..Default::default()
        }
    }

    fn dist(id: &str, did: &str, version_id: &str) -> Distribution {
        Distribution {
            id: id.into(),
            did: did.into(),
            name: did.into(),
            version_id: version_id.into(),
            ..Default::default()
        }
    }

    fn la(digest: &[u8], packages: Vec<Package>) -> LayerArtifacts {
        let mut databases: Vec<String> = Vec::new();
        for p in &packages {
            if !databases.contains(&p.package_db) {
                databases.push(p.package_db.clone());
            }
        }
        LayerArtifacts {
            digest: Digest::sha256_of(digest),
            layer: None,
            packages,
            databases,
            distributions: vec![],
            repositories: vec![],
        }
    }

    #[tokio::test]
    async fn test_upgrade_emits_only_newer_version() {
        let manifest = Digest::sha256_of(b"m");
        let layers = vec![
            la(b"l1", vec![pkg("1", "foo", "1.0-1", "var/lib/rpm")]),
            la(b"l2", vec![pkg("2", "foo", "2.0-1", "var/lib/rpm")]),
        ];
        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &layers, &CoalesceOptions::default())
            .await
            .unwrap();
        assert_eq!(report.packages.len(), 1);
        let p = &report.packages["2"];
        assert_eq!(p.version, "2.0-1");
        assert_eq!(
            report.environments["2"][0].introduced_in,
            Digest::sha256_of(b"l2")
        );
    }

    #[tokio::test]
    async fn test_removal_of_all_packages_yields_none() {
        // The removing layer's recorded database set names the rewritten
        // database even though no packages survive in it. No layer handle
        // is needed, so this holds when the layer was scanned by an
        // earlier manifest and never refetched.
        let manifest = Digest::sha256_of(b"m");
        let mut removing = la(b"l2", vec![]);
        removing.databases = vec!["var/lib/rpm/rpmdb.sqlite".to_string()];
        let layers = vec![
            la(b"l1", vec![pkg("1", "foo", "1.0-1", "var/lib/rpm/rpmdb.sqlite")]),
            removing,
        ];
        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &layers, &CoalesceOptions::default())
            .await
            .unwrap();
        assert!(report.packages.is_empty());
        assert!(report.environments.is_empty());
    }

    #[tokio::test]
    async fn test_untouched_db_survives_later_layers() {
        // A later layer that does not carry the database leaves the older
        // packages in place.
        let manifest = Digest::sha256_of(b"m");
        let layers = vec![
            la(b"l1", vec![pkg("1", "foo", "1.0-1", "var/lib/rpm/rpmdb.sqlite")]),
            la(b"l2", vec![]),
        ];
        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &layers, &CoalesceOptions::default())
            .await
            .unwrap();
        assert_eq!(report.packages.len(), 1);
    }

    #[tokio::test]
    async fn test_distribution_inheritance_and_replacement() {
        let manifest = Digest::sha256_of(b"m");
        let mut l1 = la(b"l1", vec![]);
        l1.distributions = vec![dist("8", "almalinux", "8.4")];
        let l2 = la(b"l2", vec![pkg("1", "bash", "4.4.19-12.el8", "var/lib/rpm")]);
        let mut l3 = la(b"l3", vec![]);
        l3.distributions = vec![dist("9", "almalinux", "9.0")];
        let l4 = la(b"l4", vec![pkg("2", "zsh", "5.8-9.el9", "opt/db")]);

        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &[l1, l2, l3, l4], &CoalesceOptions::default())
            .await
            .unwrap();
        // bash inherits the distribution current at its introducing layer.
        assert_eq!(report.environments["1"][0].distribution_id, "8");
        // zsh picks up the replacement distribution.
        assert_eq!(report.environments["2"][0].distribution_id, "9");
        assert_eq!(report.distributions.len(), 2);
    }

    #[tokio::test]
    async fn test_repository_cpe_propagates_to_first_sighting() {
        let manifest = Digest::sha256_of(b"m");
        let mut l1 = la(b"l1", vec![]);
        l1.repositories = vec![Repository {
            id: "10".into(),
            name: "baseos".into(),
            key: "rhel-cpe-repository".into(),
            ..Default::default()
        }];
        let mut l2 = la(b"l2", vec![]);
        l2.repositories = vec![Repository {
            id: "11".into(),
            name: "baseos".into(),
            key: "rhel-cpe-repository".into(),
            cpe: "cpe:2.3:o:redhat:enterprise_linux:8:*:baseos:*:*:*:*:*".into(),
            ..Default::default()
        }];
        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &[l1, l2], &CoalesceOptions::default())
            .await
            .unwrap();
        assert_eq!(report.repositories.len(), 1);
        let repo = report.repositories.values().next().unwrap();
        assert_eq!(repo.id, "10");
        assert!(!repo.cpe.is_empty());
    }

    #[tokio::test]
    async fn test_environment_keys_match_package_keys() {
        let manifest = Digest::sha256_of(b"m");
        let layers = vec![
            la(b"l1", vec![pkg("1", "foo", "1.0-1", "db-a"), pkg("2", "bar", "2.0-1", "db-b")]),
        ];
        let report = LinuxCoalescer::new()
            .coalesce(&manifest, &layers, &CoalesceOptions::default())
            .await
            .unwrap();
        let pkg_ids: HashSet<_> = report.packages.keys().collect();
        let env_ids: HashSet<_> = report.environments.keys().collect();
        assert_eq!(pkg_ids, env_ids);
    }
}
