//! LayerBOM: container-layer inventory and vulnerability matching
//!
//! The two entry points mirror the two halves of the engine:
//!
//! - [`Indexer`] turns a manifest (an ordered stack of layers) into an
//!   [`IndexReport`] of installed packages, distributions, repositories,
//!   and the environments they were observed in.
//! - [`VulnerabilityMatcher`] correlates a finished report against the
//!   advisory records the updaters maintain in the store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use layerbom::{Indexer, IndexerOptions, RegistryOptions, StaticFetcher};
//! use layerbom_store::MemoryStore;
//!
//! # async fn run(manifest: layerbom_core::Manifest) -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let indexer = Indexer::new(
//!     store,
//!     Arc::new(StaticFetcher::new()),
//!     vec![layerbom_rhel::ecosystem(vec![], vec![])],
//!     IndexerOptions::default(),
//!     RegistryOptions::default(),
//! )?;
//! let report = indexer.index(&manifest).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::sync::Arc;

pub use layerbom_core::{
    Digest, Distribution, Environment, IndexRecord, IndexReport, IndexState, Layer, LayerRef,
    Manifest, Package, Repository, Severity, Vulnerability, VulnerabilityReport,
};
pub use layerbom_cpe as cpe;
pub use layerbom_index::{
    Detector, Ecosystem, IndexerOptions, LayerFetcher, RegistryOptions, StaticFetcher,
};
pub use layerbom_match::{MatchOptions, Matcher};
pub use layerbom_store::{IndexStore, MemoryStore, UpdaterLock, VulnStore};
pub use layerbom_updaters::{UpdateDriver, UpdateOptions, Updater};

use layerbom_index::{Controller, DetectorSets};

/// The indexing entry point: ecosystems, store, and fetcher wired into a
/// manifest controller.
pub struct Indexer {
    controller: Controller,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn IndexStore>,
        fetcher: Arc<dyn LayerFetcher>,
        ecosystems: Vec<Ecosystem>,
        opts: IndexerOptions,
        registry: RegistryOptions,
    ) -> Result<Self> {
        let sets = DetectorSets::build(ecosystems, &registry)?;
        Ok(Indexer {
            controller: Controller::new(store, fetcher, sets, opts),
        })
    }

    /// Index one manifest. A failed run is reported on the returned
    /// report, not as an `Err`.
    pub async fn index(&self, manifest: &Manifest) -> Result<IndexReport> {
        self.controller.index(manifest).await
    }
}

/// The matching entry point.
pub struct VulnerabilityMatcher {
    store: Arc<dyn VulnStore>,
    matchers: Vec<Arc<dyn Matcher>>,
    opts: MatchOptions,
}

impl VulnerabilityMatcher {
    pub fn new(store: Arc<dyn VulnStore>, matchers: Vec<Arc<dyn Matcher>>) -> Self {
        VulnerabilityMatcher {
            store,
            matchers,
            opts: MatchOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: MatchOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Correlate a finished index report against the stored advisories.
    pub async fn scan(&self, report: &IndexReport) -> Result<VulnerabilityReport> {
        layerbom_match::match_report(self.store.as_ref(), report, &self.matchers, &self.opts).await
    }
}
