//! Detector capability surface
//!
//! A detector examines one layer and produces typed artifacts. The two
//! optional sub-capabilities are discovered through explicit hooks rather
//! than downcasting: a detector that wants startup configuration overrides
//! `as_configurable`, one that talks to the network overrides `as_remote`
//! (and is filtered out entirely under airgap).

use anyhow::Result;
use async_trait::async_trait;
use layerbom_core::{DetectorInfo, DetectorKind, Distribution, Layer, Package, Repository};

/// Typed output of one `(layer, detector)` scan.
#[derive(Debug, Clone)]
pub enum Artifacts {
    /// Packages found, plus every package-database path the detector saw
    /// on the layer. A database the layer rewrote with no surviving
    /// packages still appears in `databases`; the store keeps that fact
    /// per layer digest so the coalescer can seal the database even when
    /// the layer itself is not refetched in a later run.
    Packages {
        packages: Vec<Package>,
        databases: Vec<String>,
    },
    Distributions(Vec<Distribution>),
    Repositories(Vec<Repository>),
}

impl Artifacts {
    /// Packages plus the databases they imply. Detectors that can observe
    /// an empty database must build the variant directly instead, listing
    /// the database with no packages referencing it.
    pub fn from_packages(packages: Vec<Package>) -> Artifacts {
        let mut databases: Vec<String> = Vec::new();
        for p in &packages {
            if !p.package_db.is_empty() && !databases.contains(&p.package_db) {
                databases.push(p.package_db.clone());
            }
        }
        Artifacts::Packages {
            packages,
            databases,
        }
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Artifacts::Packages { .. } => DetectorKind::Package,
            Artifacts::Distributions(_) => DetectorKind::Distribution,
            Artifacts::Repositories(_) => DetectorKind::Repository,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Artifacts::Packages { packages, .. } => packages.len(),
            Artifacts::Distributions(v) => v.len(),
            Artifacts::Repositories(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Startup configuration hook.
pub trait Configurable {
    fn configure(&mut self, config: serde_json::Value) -> Result<()>;
}

/// Network transport hook. Remote detectors are dropped when airgap is
/// set; otherwise they are offered the shared client before first scan.
pub trait RemoteDetector {
    fn set_client(&mut self, client: reqwest::Client) -> Result<()>;
}

/// One content detector.
///
/// Implementations must be safe to call from multiple tasks and must honor
/// cancellation at every blocking step; a scan future may be dropped at
/// any await point.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn kind(&self) -> DetectorKind;

    /// Examine a layer. The returned artifacts must match `kind()`.
    async fn scan(&self, layer: &Layer) -> Result<Artifacts>;

    fn as_configurable(&mut self) -> Option<&mut dyn Configurable> {
        None
    }

    fn as_remote(&mut self) -> Option<&mut dyn RemoteDetector> {
        None
    }
}

impl dyn Detector {
    /// Store-facing identity of this detector.
    pub fn info(&self) -> DetectorInfo {
        DetectorInfo::new(self.name(), self.version(), self.kind())
    }
}
