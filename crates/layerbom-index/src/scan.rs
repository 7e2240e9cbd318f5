//! Concurrent layer scanning
//!
//! The cartesian product of unique layers and configured detectors is
//! spawned eagerly into a task set; a weighted semaphore caps how many
//! detector scans are in flight. Work already memoized in the store is
//! skipped, and a completion mark is written only after both the scan and
//! the artifact write succeed, so recovery re-runs incomplete pairs. The
//! first failing pair aborts the whole scan.

use crate::detector::{Artifacts, Detector};
use anyhow::{anyhow, Context, Result};
use layerbom_core::{Digest, Layer};
use layerbom_store::IndexStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Fans `(layer, detector)` work out under a concurrency budget.
pub struct LayerScanner {
    store: Arc<dyn IndexStore>,
    semaphore: Arc<Semaphore>,
}

impl LayerScanner {
    pub fn new(store: Arc<dyn IndexStore>, concurrency: usize) -> Self {
        LayerScanner {
            store,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Scan every `(unique layer, detector)` pair. Unordered; returns when
    /// all pairs have completed or the first error cancels the rest.
    pub async fn scan(
        &self,
        manifest: &Digest,
        layers: &[Layer],
        detectors: &[Arc<dyn Detector>],
    ) -> Result<()> {
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut seen: HashSet<Digest> = HashSet::new();
        for layer in layers {
            if !seen.insert(layer.digest().clone()) {
                continue;
            }
            for detector in detectors {
                tasks.spawn(scan_one(
                    Arc::clone(&self.store),
                    Arc::clone(&self.semaphore),
                    layer.clone(),
                    Arc::clone(detector),
                ));
            }
        }
        debug!(
            "manifest {}: scanning {} pairs ({} unique layers x {} detectors)",
            manifest,
            seen.len() * detectors.len(),
            seen.len(),
            detectors.len()
        );

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(join) if join.is_cancelled() => {}
                Err(join) if join.is_panic() => {
                    // Invariant violations crash; re-raise the panic
                    // instead of downgrading it to an indexing error.
                    tasks.abort_all();
                    std::panic::resume_unwind(join.into_panic());
                }
                Err(join) => {
                    tasks.abort_all();
                    return Err(anyhow!("scan task failed: {join}"));
                }
            }
        }
        Ok(())
    }
}

async fn scan_one(
    store: Arc<dyn IndexStore>,
    semaphore: Arc<Semaphore>,
    layer: Layer,
    detector: Arc<dyn Detector>,
) -> Result<()> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| anyhow!("scan cancelled"))?;
    let info = detector.info();

    if store.layer_scanned(layer.digest(), &info).await? {
        trace!("{} already scanned by {}", layer.digest(), info);
        return Ok(());
    }

    let artifacts = detector
        .scan(&layer)
        .await
        .with_context(|| format!("detector {} failed on layer {}", info, layer.digest()))?;
    if artifacts.kind() != info.kind {
        panic!(
            "invariant violation: detector {} returned {} artifacts",
            info,
            artifacts.kind()
        );
    }
    trace!(
        "{}: {} artifacts from {}",
        layer.digest(),
        artifacts.len(),
        info
    );

    match artifacts {
        Artifacts::Packages {
            packages,
            databases,
        } => {
            store.index_packages(&packages, layer.digest(), &info).await?;
            store
                .index_package_databases(&databases, layer.digest(), &info)
                .await?;
        }
        Artifacts::Distributions(d) => {
            store.index_distributions(&d, layer.digest(), &info).await?
        }
        Artifacts::Repositories(r) => store.index_repositories(&r, layer.digest(), &info).await?,
    }
    store.set_layer_scanned(layer.digest(), &info).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use layerbom_core::DetectorKind;
    use layerbom_core::Package;
    use layerbom_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingDetector {
        name: String,
        scans: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Detector for CountingDetector {
        fn name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> &str {
            "1"
        }
        fn kind(&self) -> DetectorKind {
            DetectorKind::Package
        }
        async fn scan(&self, _layer: &Layer) -> Result<Artifacts> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.scans.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("synthetic detector failure");
            }
            Ok(Artifacts::from_packages(vec![Package {
                name: "fake".into(),
                version: "1-1".into(),
                package_db: "db".into(),
                ..Default::default()
            }]))
        }
    }

    fn fixture(
        n: usize,
        scans: &Arc<AtomicUsize>,
        max_in_flight: &Arc<AtomicUsize>,
    ) -> Vec<Arc<dyn Detector>> {
        let in_flight = Arc::new(AtomicUsize::new(0));
        (0..n)
            .map(|i| {
                Arc::new(CountingDetector {
                    name: format!("det-{i}"),
                    scans: Arc::clone(scans),
                    in_flight: Arc::clone(&in_flight),
                    max_in_flight: Arc::clone(max_in_flight),
                    fail: false,
                }) as Arc<dyn Detector>
            })
            .collect()
    }

    fn layers(n: usize) -> (tempfile::TempDir, Vec<Layer>) {
        let dir = tempfile::TempDir::new().unwrap();
        let layers = (0..n)
            .map(|i| {
                Layer::new(
                    Digest::sha256_of(format!("layer-{i}").as_bytes()),
                    dir.path().to_path_buf(),
                )
            })
            .collect();
        (dir, layers)
    }

    #[tokio::test]
    async fn test_cold_scan_runs_every_pair_within_budget() {
        let store = Arc::new(MemoryStore::new());
        let scans = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let detectors = fixture(3, &scans, &max_in_flight);
        let (_dir, layers) = layers(10);

        let scanner = LayerScanner::new(store.clone(), 2);
        let manifest = Digest::sha256_of(b"m");
        scanner.scan(&manifest, &layers, &detectors).await.unwrap();
        assert_eq!(scans.load(Ordering::SeqCst), 30);
        assert!(max_in_flight.load(Ordering::SeqCst) <= 2);

        // Warm cache: every pair is memoized, zero scans happen.
        scans.store(0, Ordering::SeqCst);
        scanner.scan(&manifest, &layers, &detectors).await.unwrap();
        assert_eq!(scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_layers_collapse() {
        let store = Arc::new(MemoryStore::new());
        let scans = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let detectors = fixture(1, &scans, &max_in_flight);
        let (_dir, mut layers) = layers(2);
        layers.push(layers[0].clone());

        LayerScanner::new(store, 4)
            .scan(&Digest::sha256_of(b"m"), &layers, &detectors)
            .await
            .unwrap();
        assert_eq!(scans.load(Ordering::SeqCst), 2);
    }

    struct LyingDetector;

    #[async_trait]
    impl Detector for LyingDetector {
        fn name(&self) -> &str {
            "lying"
        }
        fn version(&self) -> &str {
            "1"
        }
        fn kind(&self) -> DetectorKind {
            DetectorKind::Package
        }
        async fn scan(&self, _layer: &Layer) -> Result<Artifacts> {
            Ok(Artifacts::Distributions(vec![]))
        }
    }

    #[tokio::test]
    #[should_panic(expected = "invariant violation")]
    async fn test_kind_mismatch_is_an_invariant_crash() {
        let store = Arc::new(MemoryStore::new());
        let (_dir, layers) = layers(1);
        let detector: Arc<dyn Detector> = Arc::new(LyingDetector);
        let _ = LayerScanner::new(store, 1)
            .scan(&Digest::sha256_of(b"m"), &layers, &[detector])
            .await;
    }

    #[tokio::test]
    async fn test_detector_error_fails_scan_and_skips_mark() {
        let store = Arc::new(MemoryStore::new());
        let failing: Arc<dyn Detector> = Arc::new(CountingDetector {
            name: "bad".into(),
            scans: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fail: true,
        });
        let (_dir, layers) = layers(1);
        let err = LayerScanner::new(store.clone(), 1)
            .scan(&Digest::sha256_of(b"m"), &layers, &[failing.clone()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed on layer"));

        let info = failing.info();
        assert!(!store.layer_scanned(layers[0].digest(), &info).await.unwrap());
    }
}
