//! Core data model for LayerBOM
//!
//! Everything the indexer and matcher exchange lives here: content
//! digests, layers and manifests, the package/distribution/repository
//! inventory types, index reports, and normalized vulnerability records.
//! Persistence and matching logic live in the sibling crates; this crate
//! is plain data plus the invariants the data carries.

mod detector;
mod digest;
mod distribution;
mod environment;
mod layer;
mod package;
mod report;
mod repository;
mod severity;
mod vulnerability;

pub use detector::{DetectorInfo, DetectorKind};
pub use digest::{Digest, DigestAlgorithm, DigestError};
pub use distribution::{distribution_for, Distribution, DistributionCache};
pub use environment::Environment;
pub use layer::{Layer, LayerRef, Manifest};
pub use package::{Package, PackageKind};
pub use report::{IndexReport, IndexState, VulnerabilityReport};
pub use repository::Repository;
pub use severity::Severity;
pub use vulnerability::{ArchOp, Vulnerability};

/// A flattened `(package, distribution, repository)` tuple fed to matchers.
///
/// One record is emitted per package × environment sighting; a package seen
/// in two repositories yields two records sharing the same package.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexRecord {
    pub package: Package,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}
