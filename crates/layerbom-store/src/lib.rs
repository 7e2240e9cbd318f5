//! Store contracts for LayerBOM
//!
//! These traits define what the indexer, coalescer, matcher, and updater
//! orchestration require from persistence, abstracted from any physical
//! schema:
//!
//! - `IndexStore`: artifact writes, per-(layer, detector) memoization,
//!   report persistence, and the queries the coalescer consumes.
//! - `VulnStore`: fingerprints, wholesale and differential vulnerability
//!   refresh, and the candidate query the matcher drives.
//! - `UpdaterLock`: a distributed lock keyed by updater name.
//!
//! `MemoryStore` implements all three for tests and air-gapped runs. Any
//! backend must provide idempotent writes, read-your-writes within a
//! manifest, and monotone completion marks.

mod memory;
mod page;

pub use memory::MemoryStore;
pub use page::{autosize, Paged, Pool, RingBuffer};

use async_trait::async_trait;
use layerbom_core::{
    DetectorInfo, Digest, Distribution, IndexRecord, IndexReport, Package, Repository,
    Vulnerability,
};
use std::collections::HashMap;
use thiserror::Error;

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no index report for manifest {0}")]
    ReportNotFound(String),
    #[error("store backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Attributes the store must use to index-seek vulnerability candidates
/// for a record. Package name is always implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConstraint {
    PackageModule,
    RepositoryKey,
    RepositoryName,
    DistributionDid,
    DistributionId,
    DistributionVersion,
    DistributionVersionId,
}

/// Counts out of a vulnerability refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateDiff {
    pub added: usize,
    pub removed: usize,
}

/// Persistence contract of the indexer pipeline.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Whether this manifest has already been indexed under exactly this
    /// detector set.
    async fn manifest_scanned(
        &self,
        manifest: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<bool>;

    /// Per-(layer, detector) completion mark query.
    async fn layer_scanned(&self, layer: &Digest, detector: &DetectorInfo) -> StoreResult<bool>;

    /// Write the completion mark. At most one successful mark per pair;
    /// marks are never cleared outside an administrative reset.
    async fn set_layer_scanned(&self, layer: &Digest, detector: &DetectorInfo) -> StoreResult<()>;

    /// Idempotent artifact writes scoped to `(layer, detector)`.
    async fn index_packages(
        &self,
        packages: &[Package],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()>;
    async fn index_distributions(
        &self,
        distributions: &[Distribution],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()>;
    async fn index_repositories(
        &self,
        repositories: &[Repository],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()>;

    /// Record the package-database paths a detector found on a layer,
    /// including databases with no surviving packages. Durable per layer
    /// digest, like the completion mark, so later manifests reusing an
    /// already-scanned layer still learn which databases it rewrote.
    async fn index_package_databases(
        &self,
        databases: &[String],
        layer: &Digest,
        detector: &DetectorInfo,
    ) -> StoreResult<()>;

    /// Typed lookups consumed by the coalescer. Results carry store ids.
    async fn packages_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Package>>;
    async fn distributions_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Distribution>>;
    async fn repositories_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<Repository>>;

    /// The package-database paths recorded for a layer, deduplicated.
    async fn package_databases_by_layer(
        &self,
        layer: &Digest,
        detectors: &[DetectorInfo],
    ) -> StoreResult<Vec<String>>;

    /// Upsert of the in-progress report; called at every transition.
    async fn set_index_report(&self, report: &IndexReport) -> StoreResult<()>;

    /// Promote report entities into the queryable index.
    async fn index_manifest(&self, report: &IndexReport) -> StoreResult<()>;

    /// Record successful completion for this detector set.
    async fn set_index_finished(
        &self,
        report: &IndexReport,
        detectors: &[DetectorInfo],
    ) -> StoreResult<()>;

    /// Stored report for the CheckManifest fast path.
    async fn index_report(&self, manifest: &Digest) -> StoreResult<Option<IndexReport>>;
}

/// Persistence contract of updaters and the matcher.
#[async_trait]
pub trait VulnStore: Send + Sync {
    /// Last fingerprint recorded for an updater, if any.
    async fn get_update_fingerprint(&self, updater: &str) -> StoreResult<Option<String>>;

    /// Replace the updater's records wholesale and set the fingerprint
    /// atomically with the record changes.
    async fn update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: &str,
        vulns: Vec<Vulnerability>,
    ) -> StoreResult<UpdateDiff>;

    /// Differential refresh: upsert records for the changed advisories,
    /// tombstone the deleted advisory names, update the fingerprint
    /// atomically.
    async fn delta_update_vulnerabilities(
        &self,
        updater: &str,
        fingerprint: &str,
        added: Vec<Vulnerability>,
        deleted: &[String],
    ) -> StoreResult<UpdateDiff>;

    /// Candidate vulnerabilities per record index, seeking on package name
    /// plus the given constraints. With `ignore_unpatched`, records whose
    /// advisory carries no fixed version are never returned.
    async fn get(
        &self,
        records: &[IndexRecord],
        constraints: &[MatchConstraint],
        ignore_unpatched: bool,
    ) -> StoreResult<HashMap<usize, Vec<Vulnerability>>>;
}

/// Held while an updater refreshes; releases on drop.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        LockGuard {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

/// Distributed lock keyed by updater name.
#[async_trait]
pub trait UpdaterLock: Send + Sync {
    /// Acquire without blocking. `None` means another holder has the key;
    /// the caller skips its run.
    async fn try_lock(&self, key: &str) -> StoreResult<Option<LockGuard>>;
}

/// Canonical key for a detector set: order-independent and stable.
pub fn detector_set_key(detectors: &[DetectorInfo]) -> String {
    let mut parts: Vec<String> = detectors.iter().map(|d| d.to_string()).collect();
    parts.sort();
    parts.dedup();
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::DetectorKind;

    #[test]
    fn test_detector_set_key_is_order_independent() {
        let a = DetectorInfo::new("rpm", "1", DetectorKind::Package);
        let b = DetectorInfo::new("os-release", "2", DetectorKind::Distribution);
        assert_eq!(
            detector_set_key(&[a.clone(), b.clone()]),
            detector_set_key(&[b, a])
        );
    }
}
