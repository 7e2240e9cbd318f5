//! In-memory store
//!
//! Implements all three store contracts behind a single mutex. Used by the
//! test suites and by air-gapped runs that do not persist across
//! processes. Write paths mirror the guarantees a database-backed store
//! must provide: idempotent artifact writes, read-your-writes, and
//! completion marks that are never cleared.

use crate::{
    detector_set_key, IndexStore, LockGuard, MatchConstraint, StoreResult, UpdateDiff,
    UpdaterLock, VulnStore,
};
use async_trait::async_trait;
use layerbom_core::{
    DetectorInfo, Digest, Distribution, IndexRecord, IndexReport, Package, Repository,
    Vulnerability,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default)]
struct Inner {
    // (layer digest, detector) -> completion mark
    layer_scans: HashSet<(String, String)>,
    // (layer digest, detector) -> artifacts
    packages: HashMap<(String, String), Vec<Package>>,
    distributions: HashMap<(String, String), Vec<Distribution>>,
    repositories: HashMap<(String, String), Vec<Repository>>,
    // (layer digest, detector) -> package-database paths on that layer
    package_dbs: HashMap<(String, String), Vec<String>>,
    // entity id assignment, keyed by similarity
    ids: HashMap<String, String>,
    next_id: u64,
    // manifest digest -> in-progress/terminal report
    reports: HashMap<String, IndexReport>,
    // manifest digest -> detector-set keys that finished
    finished: HashMap<String, HashSet<String>>,
    // updater name -> advisory name -> records
    vulns: HashMap<String, HashMap<String, Vec<Vulnerability>>>,
    fingerprints: HashMap<String, String>,
}

impl Inner {
    fn assign_id(&mut self, similarity: String) -> String {
        if let Some(id) = self.ids.get(&similarity) {
            return id.clone();
        }
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.ids.insert(similarity, id.clone());
        id
    }
}

/// The in-memory reference store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair_key(layer: &Digest, detector: &DetectorInfo) -> (String, String) {
        (layer.to_string(), detector.to_string())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn manifest_scanned(
        &self,
        manifest: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<bool> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .finished
            .get(&manifest.to_string())
            .is_some_and(|keys| keys.contains(&detector_set_key(detectors))))
    }

    async fn layer_scanned(&self, layer: &Digest, detector: &DetectorInfo) -> StoreResult<bool> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.layer_scans.contains(&Self::pair_key(layer, detector)))
    }

    async fn set_layer_scanned(&self, layer: &Digest, detector: &DetectorInfo) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.layer_scans.insert(Self::pair_key(layer, detector));
        Ok(())
    }

    async fn index_packages(
        &self,
        packages: &[Package],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut stored = Vec::with_capacity(packages.len());
        for p in packages {
            let mut p = p.clone();
            p.id = inner.assign_id(format!("package\u{0}{}", p.similarity_key()));
            if let Some(src) = p.source.take() {
                // The source field arrives as a similarity reference from
                // detectors; rewrite it to the assigned id.
                p.source = Some(inner.assign_id(format!("package\u{0}{src}")));
            }
            stored.push(p);
        }
        inner.packages.insert(Self::pair_key(layer, detector), stored);
        Ok(())
    }

    async fn index_distributions(
        &self,
        distributions: &[Distribution],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut stored = Vec::with_capacity(distributions.len());
        for d in distributions {
            let mut d = d.clone();
            if d.id.is_empty() {
                d.id = inner.assign_id(format!(
                    "distribution\u{0}{}\u{0}{}\u{0}{}",
                    d.did, d.version_id, d.name
                ));
            }
            stored.push(d);
        }
        inner
            .distributions
            .insert(Self::pair_key(layer, detector), stored);
        Ok(())
    }

    async fn index_repositories(
        &self,
        repositories: &[Repository],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut stored = Vec::with_capacity(repositories.len());
        for r in repositories {
            let mut r = r.clone();
            r.id = inner.assign_id(format!("repository\u{0}{}", r.similarity_key()));
            stored.push(r);
        }
        inner
            .repositories
            .insert(Self::pair_key(layer, detector), stored);
        Ok(())
    }

    async fn index_package_databases(
        &self,
        databases: &[String],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .package_dbs
            .insert(Self::pair_key(layer, detector), databases.to_vec());
        Ok(())
    }

    async fn packages_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Package>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out = Vec::new();
        for d in detectors {
            if let Some(v) = inner.packages.get(&Self::pair_key(layer, d)) {
                out.extend(v.iter().cloned());
            }
        }
        Ok(out)
    }

    async fn distributions_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Distribution>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out = Vec::new();
        for d in detectors {
            if let Some(v) = inner.distributions.get(&Self::pair_key(layer, d)) {
                out.extend(v.iter().cloned());
            }
        }
        Ok(out)
    }

    async fn repositories_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Repository>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out = Vec::new();
        for d in detectors {
            if let Some(v) = inner.repositories.get(&Self::pair_key(layer, d)) {
                out.extend(v.iter().cloned());
            }
        }
        Ok(out)
    }

    async fn package_databases_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out: Vec<String> = Vec::new();
        for d in detectors {
            if let Some(dbs) = inner.package_dbs.get(&Self::pair_key(layer, d)) {
                for db in dbs {
                    if !out.contains(db) {
                        out.push(db.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn set_index_report(&self, report: &IndexReport) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .reports
            .insert(report.manifest.to_string(), report.clone());
        Ok(())
    }

    async fn index_manifest(&self, report: &IndexReport) -> StoreResult<()> {
        // Promotion is a no-op beyond report persistence here; a database
        // store materializes the queryable index in this step.
        self.set_index_report(report).await
    }

    async fn set_index_finished(
        &self,
        report: &IndexReport,
        detectors: &[DetectorInfo],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .reports
            .insert(report.manifest.to_string(), report.clone());
        inner
            .finished
            .entry(report.manifest.to_string())
            .or_default()
            .insert(detector_set_key(detectors));
        Ok(())
    }

    async fn index_report(&self, manifest: &Digest) -> StoreResult<Option<IndexReport>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.reports.get(&manifest.to_string()).cloned())
    }
}

fn vuln_similarity(v: &Vulnerability) -> String {
    format!(
        "vulnerability\u{0}{}\u{0}{}\u{0}{}\u{0}{}",
        v.updater,
        v.name,
        v.package.as_ref().map(|p| p.name.as_str()).unwrap_or(""),
        v.fixed_in_version
    )
}

fn constraint_holds(c: MatchConstraint, record: &IndexRecord, vuln: &Vulnerability) -> bool {
    match c {
        MatchConstraint::PackageModule => {
            vuln.package.as_ref().map(|p| p.module.as_str()).unwrap_or("")
                == record.package.module
        }
        MatchConstraint::RepositoryKey => {
            let want = vuln.repo.as_ref().map(|r| r.key.as_str()).unwrap_or("");
            record
                .repository
                .as_ref()
                .is_some_and(|r| r.key == want)
        }
        MatchConstraint::RepositoryName => {
            let want = vuln.repo.as_ref().map(|r| r.name.as_str()).unwrap_or("");
            record
                .repository
                .as_ref()
                .is_some_and(|r| r.name == want)
        }
        MatchConstraint::DistributionDid => {
            let want = vuln.dist.as_ref().map(|d| d.did.as_str()).unwrap_or("");
            record.distribution.as_ref().is_some_and(|d| d.did == want)
        }
        MatchConstraint::DistributionId => {
            let want = vuln.dist.as_ref().map(|d| d.id.as_str()).unwrap_or("");
            record.distribution.as_ref().is_some_and(|d| d.id == want)
        }
        MatchConstraint::DistributionVersion => {
            let want = vuln.dist.as_ref().map(|d| d.version.as_str()).unwrap_or("");
            record
                .distribution
                .as_ref()
                .is_some_and(|d| d.version == want)
        }
        MatchConstraint::DistributionVersionId => {
            let want = vuln
                .dist
                .as_ref()
                .map(|d| d.version_id.as_str())
                .unwrap_or("");
            record
                .distribution
                .as_ref()
                .is_some_and(|d| d.version_id == want)
        }
    }
}

#[async_trait]
impl VulnStore for MemoryStore {
    async fn get_update_fingerprint(&self, updater: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.fingerprints.get(updater).cloned())
    }

    async fn update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: &str,
        vulns: Vec<Vulnerability>,
    ) -> StoreResult<UpdateDiff> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut by_name: HashMap<String, Vec<Vulnerability>> = HashMap::new();
        for mut v in vulns {
            v.updater = updater.to_string();
            if v.id.is_empty() {
                v.id = inner.assign_id(vuln_similarity(&v));
            }
            by_name.entry(v.name.clone()).or_default().push(v);
        }
        let old = inner.vulns.insert(updater.to_string(), by_name);
        inner
            .fingerprints
            .insert(updater.to_string(), fingerprint.to_string());

        let new = &inner.vulns[updater];
        let old_names: HashSet<&String> = old.iter().flat_map(|m| m.keys()).collect();
        let diff = UpdateDiff {
            added: new.keys().filter(|n| !old_names.contains(n)).count(),
            removed: old_names
                .iter()
                .filter(|n| !new.contains_key(n.as_str()))
                .count(),
        };
        debug!(
            "updated vulnerabilities for {}: +{} -{}",
            updater, diff.added, diff.removed
        );
        Ok(diff)
    }

    async fn delta_update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: &str,
        added: Vec<Vulnerability>,
        deleted: &[String],
    ) -> StoreResult<UpdateDiff> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let mut incoming: HashMap<String, Vec<Vulnerability>> = HashMap::new();
        for mut v in added {
            v.updater = updater.to_string();
            if v.id.is_empty() {
                v.id = inner.assign_id(vuln_similarity(&v));
            }
            incoming.entry(v.name.clone()).or_default().push(v);
        }
        let entry = inner.vulns.entry(updater.to_string()).or_default();
        let mut diff = UpdateDiff::default();
        for (name, records) in incoming {
            if entry.insert(name, records).is_none() {
                diff.added += 1;
            }
        }
        for name in deleted {
            if entry.remove(name).is_some() {
                diff.removed += 1;
            }
        }
        inner
            .fingerprints
            .insert(updater.to_string(), fingerprint.to_string());
        Ok(diff)
    }

    async fn get(
        &self,
        records: &[IndexRecord],
        constraints: &[MatchConstraint],
        ignore_unpatched: bool,
    ) -> StoreResult<HashMap<usize, Vec<Vulnerability>>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut out: HashMap<usize, Vec<Vulnerability>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            for per_name in inner.vulns.values() {
                for vulns in per_name.values() {
                    for v in vulns {
                        let name_matches = v
                            .package
                            .as_ref()
                            .is_some_and(|p| p.name == record.package.name);
                        if !name_matches {
                            continue;
                        }
                        if ignore_unpatched && !v.fixed() {
                            continue;
                        }
                        if constraints.iter().all(|c| constraint_holds(*c, record, v)) {
                            out.entry(i).or_default().push(v.clone());
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl UpdaterLock for MemoryStore {
    async fn try_lock(&self, key: &str) -> StoreResult<Option<LockGuard>> {
        let mut held = self.locks.lock().expect("updater locks poisoned");
        if !held.insert(key.to_string()) {
            return Ok(None);
        }
        drop(held);
        let locks = Arc::clone(&self.locks);
        let key = key.to_string();
        Ok(Some(LockGuard::new(move || {
            locks.lock().expect("updater locks poisoned").remove(&key);
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::DetectorKind;

    fn det() -> DetectorInfo {
        DetectorInfo::new("test-pkg", "1", DetectorKind::Package)
    }

    #[tokio::test]
    async fn test_layer_memoization_roundtrip() {
        let store = MemoryStore::new();
        let layer = Digest::sha256_of(b"l1");
        assert!(!store.layer_scanned(&layer, &det()).await.unwrap());
        store.set_layer_scanned(&layer, &det()).await.unwrap();
        assert!(store.layer_scanned(&layer, &det()).await.unwrap());
    }

    #[tokio::test]
    async fn test_index_packages_assigns_stable_ids() {
        let store = MemoryStore::new();
        let layer = Digest::sha256_of(b"l1");
        let pkg = Package {
            name: "bash".into(),
            version: "4.4.19-12.el8".into(),
            ..Default::default()
        };
        store.index_packages(&[pkg.clone()], &layer, &det()).await.unwrap();
        let first = store.packages_by_layer(&layer, &[det()]).await.unwrap();

        // Idempotent rewrite of the same pair keeps the same id.
        store.index_packages(&[pkg], &layer, &det()).await.unwrap();
        let second = store.packages_by_layer(&layer, &[det()]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_package_databases_persist_per_layer() {
        let store = MemoryStore::new();
        let layer = Digest::sha256_of(b"l1");
        store
            .index_package_databases(
                &["var/lib/rpm/rpmdb.sqlite".to_string()],
                &layer,
                &det(),
            )
            .await
            .unwrap();
        let dbs = store.package_databases_by_layer(&layer, &[det()]).await.unwrap();
        assert_eq!(dbs, vec!["var/lib/rpm/rpmdb.sqlite".to_string()]);

        // A database with no packages referencing it is still recorded.
        let none = store
            .packages_by_layer(&layer, &[det()])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_scanned_requires_exact_detector_set() {
        let store = MemoryStore::new();
        let report = IndexReport::new(Digest::sha256_of(b"m"));
        let set_a = vec![det()];
        let set_b = vec![det(), DetectorInfo::new("os", "1", DetectorKind::Distribution)];
        store.set_index_finished(&report, &set_a).await.unwrap();
        assert!(store.manifest_scanned(&report.manifest, &set_a).await.unwrap());
        assert!(!store.manifest_scanned(&report.manifest, &set_b).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_vulnerabilities_replaces_wholesale() {
        let store = MemoryStore::new();
        let v = |name: &str| Vulnerability {
            name: name.into(),
            package: Some(Package {
                name: "bash".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let diff = store
            .update_vulnerabilities("u", "fp1", vec![v("CVE-1"), v("CVE-2")])
            .await
            .unwrap();
        assert_eq!(diff, UpdateDiff { added: 2, removed: 0 });

        let diff = store
            .update_vulnerabilities("u", "fp2", vec![v("CVE-2"), v("CVE-3")])
            .await
            .unwrap();
        assert_eq!(diff, UpdateDiff { added: 1, removed: 1 });
        assert_eq!(
            store.get_update_fingerprint("u").await.unwrap().as_deref(),
            Some("fp2")
        );
    }

    #[tokio::test]
    async fn test_try_lock_excludes_second_holder() {
        let store = MemoryStore::new();
        let guard = store.try_lock("rhel-8").await.unwrap();
        assert!(guard.is_some());
        assert!(store.try_lock("rhel-8").await.unwrap().is_none());
        drop(guard);
        assert!(store.try_lock("rhel-8").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_honors_ignore_unpatched() {
        let store = MemoryStore::new();
        let mut unfixed = Vulnerability {
            name: "CVE-1".into(),
            package: Some(Package {
                name: "bash".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut fixed = unfixed.clone();
        fixed.name = "CVE-2".into();
        fixed.fixed_in_version = "4.4.20-1.el8".into();
        unfixed.fixed_in_version.clear();
        store
            .update_vulnerabilities("u", "fp", vec![unfixed, fixed])
            .await
            .unwrap();

        let records = vec![IndexRecord {
            package: Package {
                name: "bash".into(),
                ..Default::default()
            },
            distribution: None,
            repository: None,
        }];
        let all = store.get(&records, &[], false).await.unwrap();
        assert_eq!(all[&0].len(), 2);
        let patched_only = store.get(&records, &[], true).await.unwrap();
        assert_eq!(patched_only[&0].len(), 1);
        assert_eq!(patched_only[&0][0].name, "CVE-2");
    }
}
