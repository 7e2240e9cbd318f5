//! The LayerBOM indexer pipeline
//!
//! Drives a manifest from raw layer references to a consolidated
//! `IndexReport`:
//!
//! 1. The controller walks the manifest through its named states,
//!    persisting the report at every transition so a restart can surface
//!    partial state.
//! 2. The layer scanner fans `(layer, detector)` work out under a bounded
//!    concurrency budget, memoized in the store.
//! 3. The coalescer reduces per-layer artifacts into the final inventory
//!    under union-filesystem semantics.
//!
//! Detectors themselves are external collaborators; this crate defines
//! their capability surface and the ecosystem registry that assembles
//! them.

mod coalesce;
mod controller;
mod detector;
mod dnf;
mod fetch;
mod registry;
mod scan;

pub use coalesce::{CoalesceOptions, Coalescer, LayerArtifacts, LinuxCoalescer};
pub use controller::{Controller, IndexerOptions};
pub use detector::{Artifacts, Configurable, Detector, RemoteDetector};
pub use dnf::HistoryDb;
pub use fetch::{LayerFetcher, StaticFetcher};
pub use registry::{DetectorSets, Ecosystem, EcosystemRuntime, RegistryOptions};
pub use scan::LayerScanner;
