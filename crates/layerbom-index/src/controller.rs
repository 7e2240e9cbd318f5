//! Manifest controller
//!
//! A deterministic state machine drives each manifest:
//! `CheckManifest → FetchLayers → ScanLayers → Coalesce → IndexManifest →
//! IndexFinished → Terminal`. Any state may short-circuit to Terminal
//! (the already-indexed fast path); any error routes through IndexError.
//! The report is persisted after every transition and re-read from the
//! store, so a crash between transitions surfaces partial state instead
//! of losing committed work.

use crate::coalesce::{CoalesceOptions, LayerArtifacts};
use crate::fetch::{self, LayerFetcher};
use crate::registry::DetectorSets;
use crate::scan::LayerScanner;
use anyhow::{Context, Result};
use layerbom_core::{Digest, IndexReport, IndexState, Layer, Manifest};
use layerbom_store::IndexStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-controller options.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Concurrency budget for detector scans.
    pub concurrency: usize,
    /// Opt in to DNF repo-id annotation during coalesce.
    pub annotate_repoids: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        IndexerOptions {
            concurrency: num_cpus::get(),
            annotate_repoids: false,
        }
    }
}

struct Run<'m> {
    manifest: &'m Manifest,
    report: IndexReport,
    /// Realized layers for this run, keyed later by digest.
    layers: Vec<Layer>,
}

/// Drives manifests through the index states.
pub struct Controller {
    store: Arc<dyn IndexStore>,
    fetcher: Arc<dyn LayerFetcher>,
    sets: DetectorSets,
    scanner: LayerScanner,
    opts: IndexerOptions,
}

impl Controller {
    pub fn new(
        store: Arc<dyn IndexStore>,
        fetcher: Arc<dyn LayerFetcher>,
        sets: DetectorSets,
        opts: IndexerOptions,
    ) -> Self {
        let scanner = LayerScanner::new(Arc::clone(&store), opts.concurrency);
        Controller {
            store,
            fetcher,
            sets,
            scanner,
            opts,
        }
    }

    /// Index one manifest. Failures are encoded on the returned report
    /// (`success = false`, `state = IndexError`, message in `err`); the
    /// call itself only errs on invariant violations.
    pub async fn index(&self, manifest: &Manifest) -> Result<IndexReport> {
        let mut run = Run {
            manifest,
            report: IndexReport::new(manifest.digest.clone()),
            layers: Vec::new(),
        };
        let mut state = IndexState::CheckManifest;
        loop {
            let next = match state {
                IndexState::CheckManifest => self.check_manifest(&mut run).await,
                IndexState::FetchLayers => self.fetch_layers(&mut run).await,
                IndexState::ScanLayers => self.scan_layers(&mut run).await,
                IndexState::Coalesce => self.coalesce(&mut run).await,
                IndexState::IndexManifest => self.index_manifest(&mut run).await,
                IndexState::IndexFinished => self.index_finished(&mut run).await,
                IndexState::Terminal | IndexState::IndexError => break,
            };
            match next {
                Ok(IndexState::Terminal) => break,
                Ok(next_state) => {
                    debug!("manifest {}: {} -> {}", manifest.digest, state, next_state);
                    state = next_state;
                    run.report.state = next_state;
                    self.persist(&mut run).await;
                }
                Err(e) => {
                    warn!("manifest {}: {} failed: {e:#}", manifest.digest, state);
                    run.report.success = false;
                    run.report.err = format!("{e:#}");
                    run.report.state = IndexState::IndexError;
                    if let Err(pe) = self.store.set_index_report(&run.report).await {
                        warn!("failed to persist error report: {pe}");
                    }
                    break;
                }
            }
        }
        Ok(run.report)
    }

    /// Best-effort persistence plus a re-read, so the in-memory report
    /// never drifts ahead of what the store committed.
    async fn persist(&self, run: &mut Run<'_>) {
        if let Err(e) = self.store.set_index_report(&run.report).await {
            warn!("failed to persist report: {e}");
            return;
        }
        match self.store.index_report(&run.manifest.digest).await {
            Ok(Some(stored)) => {
                let state = run.report.state;
                run.report = stored;
                run.report.state = state;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to re-read report: {e}"),
        }
    }

    async fn check_manifest(&self, run: &mut Run<'_>) -> Result<IndexState> {
        let detectors = self.sets.infos();
        if self
            .store
            .manifest_scanned(&run.manifest.digest, &detectors)
            .await?
        {
            if let Some(stored) = self.store.index_report(&run.manifest.digest).await? {
                info!("manifest {} already indexed", run.manifest.digest);
                run.report = stored;
                return Ok(IndexState::Terminal);
            }
            warn!(
                "manifest {} marked scanned but has no stored report; re-indexing",
                run.manifest.digest
            );
        }
        Ok(IndexState::FetchLayers)
    }

    async fn fetch_layers(&self, run: &mut Run<'_>) -> Result<IndexState> {
        let fetchset =
            fetch::reduce(self.store.as_ref(), &self.sets.all(), &run.manifest.layers).await?;
        if fetchset.is_empty() {
            debug!("manifest {}: nothing to fetch", run.manifest.digest);
            run.layers.clear();
            return Ok(IndexState::ScanLayers);
        }
        run.layers = self
            .fetcher
            .realize(&fetchset)
            .await
            .context("fetching layers")?;
        Ok(IndexState::ScanLayers)
    }

    async fn scan_layers(&self, run: &mut Run<'_>) -> Result<IndexState> {
        self.scanner
            .scan(&run.manifest.digest, &run.layers, &self.sets.all())
            .await?;
        Ok(IndexState::Coalesce)
    }

    async fn coalesce(&self, run: &mut Run<'_>) -> Result<IndexState> {
        let realized: HashMap<Digest, Layer> = run
            .layers
            .iter()
            .map(|l| (l.digest().clone(), l.clone()))
            .collect();
        let mut unique: Vec<&Digest> = Vec::new();
        for digest in run.manifest.layer_digests() {
            if !unique.contains(&digest) {
                unique.push(digest);
            }
        }
        let opts = CoalesceOptions {
            annotate_repoids: self.opts.annotate_repoids,
        };

        for eco in &self.sets.ecosystems {
            let mut layers = Vec::with_capacity(unique.len());
            for digest in &unique {
                layers.push(LayerArtifacts {
                    digest: (*digest).clone(),
                    layer: realized.get(*digest).cloned(),
                    packages: self.store.packages_by_layer(digest, &eco.detectors).await?,
                    databases: self
                        .store
                        .package_databases_by_layer(digest, &eco.detectors)
                        .await?,
                    distributions: self
                        .store
                        .distributions_by_layer(digest, &eco.detectors)
                        .await?,
                    repositories: self
                        .store
                        .repositories_by_layer(digest, &eco.detectors)
                        .await?,
                });
            }
            let partial = eco
                .coalescer
                .coalesce(&run.manifest.digest, &layers, &opts)
                .await
                .with_context(|| format!("coalescing ecosystem {}", eco.name))?;
            run.report.merge(partial);
        }
        Ok(IndexState::IndexManifest)
    }

    async fn index_manifest(&self, run: &mut Run<'_>) -> Result<IndexState> {
        self.store
            .index_manifest(&run.report)
            .await
            .context("indexing manifest")?;
        Ok(IndexState::IndexFinished)
    }

    async fn index_finished(&self, run: &mut Run<'_>) -> Result<IndexState> {
        run.report.success = true;
        self.store
            .set_index_finished(&run.report, &self.sets.infos())
            .await
            .context("finishing index")?;
        info!(
            "manifest {}: indexed {} packages",
            run.manifest.digest,
            run.report.packages.len()
        );
        Ok(IndexState::Terminal)
    }
}
