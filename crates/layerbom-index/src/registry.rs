//! Ecosystem registry
//!
//! An ecosystem bundles the detectors and the coalescer for one software
//! family. The registry flattens a list of ecosystems into the three
//! kind-partitioned detector sets the scanner runs, deduplicating by
//! detector name and applying per-detector configuration.

use crate::coalesce::Coalescer;
use crate::detector::Detector;
use anyhow::Result;
use layerbom_core::{DetectorInfo, DetectorKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// A named bundle of detectors and a coalescer.
pub struct Ecosystem {
    pub name: &'static str,
    pub package_detectors: Vec<Box<dyn Detector>>,
    pub distribution_detectors: Vec<Box<dyn Detector>>,
    pub repository_detectors: Vec<Box<dyn Detector>>,
    pub coalescer: Box<dyn Coalescer>,
}

/// Registry construction options.
#[derive(Default)]
pub struct RegistryOptions {
    /// Drop detectors that require network transport.
    pub airgap: bool,
    /// Per-detector configuration, keyed by detector name.
    pub configs: HashMap<String, serde_json::Value>,
    /// Shared transport offered to remote detectors.
    pub client: Option<reqwest::Client>,
}

/// One ecosystem as assembled for a run.
pub struct EcosystemRuntime {
    pub name: &'static str,
    /// Identities of this ecosystem's surviving detectors, all kinds.
    pub detectors: Vec<DetectorInfo>,
    pub coalescer: Arc<dyn Coalescer>,
}

/// The flattened detector sets plus per-ecosystem grouping.
pub struct DetectorSets {
    pub packages: Vec<Arc<dyn Detector>>,
    pub distributions: Vec<Arc<dyn Detector>>,
    pub repositories: Vec<Arc<dyn Detector>>,
    pub ecosystems: Vec<EcosystemRuntime>,
}

impl DetectorSets {
    /// Every detector, across kinds.
    pub fn all(&self) -> Vec<Arc<dyn Detector>> {
        self.packages
            .iter()
            .chain(&self.distributions)
            .chain(&self.repositories)
            .cloned()
            .collect()
    }

    /// Identities of every detector, across kinds.
    pub fn infos(&self) -> Vec<DetectorInfo> {
        self.all().iter().map(|d| d.info()).collect()
    }

    /// Assemble the sets from a list of ecosystems.
    ///
    /// Deduplication is by detector name, first definition wins; a later
    /// ecosystem contributing the same name is warned about and dropped.
    /// Configuration for a detector that is not configurable is warned
    /// about and discarded; the detector itself stays.
    pub fn build(ecosystems: Vec<Ecosystem>, opts: &RegistryOptions) -> Result<DetectorSets> {
        let mut sets = DetectorSets {
            packages: Vec::new(),
            distributions: Vec::new(),
            repositories: Vec::new(),
            ecosystems: Vec::new(),
        };
        let mut seen: HashSet<String> = HashSet::new();

        for eco in ecosystems {
            let mut infos = Vec::new();
            for (expected, batch) in [
                (DetectorKind::Package, eco.package_detectors),
                (DetectorKind::Distribution, eco.distribution_detectors),
                (DetectorKind::Repository, eco.repository_detectors),
            ] {
                for mut det in batch {
                    let name = det.name().to_string();
                    if det.kind() != expected {
                        warn!(
                            "ecosystem {}: detector {name} reports kind {}, registered as {}; dropping",
                            eco.name,
                            det.kind(),
                            expected
                        );
                        continue;
                    }
                    if !seen.insert(name.clone()) {
                        warn!(
                            "ecosystem {}: duplicate detector name {name}; keeping the first definition",
                            eco.name
                        );
                        continue;
                    }
                    if let Some(config) = opts.configs.get(&name) {
                        match det.as_configurable() {
                            Some(c) => c.configure(config.clone())?,
                            None => warn!(
                                "configuration provided for non-configurable detector {name}; ignoring"
                            ),
                        }
                    }
                    if det.as_remote().is_some() {
                        if opts.airgap {
                            warn!("airgap: dropping remote detector {name}");
                            continue;
                        }
                        if let Some(client) = &opts.client {
                            if let Some(remote) = det.as_remote() {
                                remote.set_client(client.clone())?;
                            }
                        }
                    }
                    infos.push(det.info());
                    let det: Arc<dyn Detector> = Arc::from(det);
                    match expected {
                        DetectorKind::Package => sets.packages.push(det),
                        DetectorKind::Distribution => sets.distributions.push(det),
                        DetectorKind::Repository => sets.repositories.push(det),
                    }
                }
            }
            sets.ecosystems.push(EcosystemRuntime {
                name: eco.name,
                detectors: infos,
                coalescer: Arc::from(eco.coalescer),
            });
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coalesce::{CoalesceOptions, LayerArtifacts, LinuxCoalescer};
    use crate::detector::{Artifacts, Configurable, RemoteDetector};
    use anyhow::Result;
    use async_trait::async_trait;
    use layerbom_core::Layer;

    struct FakeDetector {
        name: &'static str,
        kind: DetectorKind,
        configurable: bool,
        remote: bool,
        configured: Option<serde_json::Value>,
    }

    impl FakeDetector {
        fn new(name: &'static str, kind: DetectorKind) -> Box<Self> {
            Box::new(FakeDetector {
                name,
                kind,
                configurable: false,
                remote: false,
                configured: None,
            })
        }
    }

    impl Configurable for FakeDetector {
        fn configure(&mut self, config: serde_json::Value) -> Result<()> {
            self.configured = Some(config);
            Ok(())
        }
    }

    impl RemoteDetector for FakeDetector {
        fn set_client(&mut self, _client: reqwest::Client) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Detector for FakeDetector {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1"
        }
        fn kind(&self) -> DetectorKind {
            self.kind
        }
        async fn scan(&self, _layer: &Layer) -> Result<Artifacts> {
            Ok(Artifacts::from_packages(vec![]))
        }
        fn as_configurable(&mut self) -> Option<&mut dyn Configurable> {
            self.configurable.then_some(self as &mut dyn Configurable)
        }
        fn as_remote(&mut self) -> Option<&mut dyn RemoteDetector> {
            self.remote.then_some(self as &mut dyn RemoteDetector)
        }
    }

    fn eco(name: &'static str, detectors: Vec<Box<dyn Detector>>) -> Ecosystem {
        Ecosystem {
            name,
            package_detectors: detectors,
            distribution_detectors: vec![],
            repository_detectors: vec![],
            coalescer: Box::new(LinuxCoalescer::new()),
        }
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let a = eco("a", vec![FakeDetector::new("rpm", DetectorKind::Package)]);
        let b = eco("b", vec![FakeDetector::new("rpm", DetectorKind::Package)]);
        let sets = DetectorSets::build(vec![a, b], &RegistryOptions::default()).unwrap();
        assert_eq!(sets.packages.len(), 1);
        assert_eq!(sets.ecosystems[0].detectors.len(), 1);
        assert!(sets.ecosystems[1].detectors.is_empty());
    }

    #[test]
    fn test_kind_mismatch_dropped() {
        let bad = eco("a", vec![FakeDetector::new("os", DetectorKind::Distribution)]);
        let sets = DetectorSets::build(vec![bad], &RegistryOptions::default()).unwrap();
        assert!(sets.packages.is_empty());
        assert!(sets.distributions.is_empty());
    }

    #[test]
    fn test_airgap_drops_remote_detectors() {
        let mut det = FakeDetector::new("remote-maven", DetectorKind::Package);
        det.remote = true;
        let sets = DetectorSets::build(
            vec![eco("a", vec![det])],
            &RegistryOptions {
                airgap: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(sets.packages.is_empty());
    }

    #[test]
    fn test_config_for_non_configurable_is_discarded() {
        let mut opts = RegistryOptions::default();
        opts.configs
            .insert("rpm".into(), serde_json::json!({"paths": []}));
        let sets = DetectorSets::build(
            vec![eco("a", vec![FakeDetector::new("rpm", DetectorKind::Package)])],
            &opts,
        )
        .unwrap();
        // Detector stays even though its configuration was dropped.
        assert_eq!(sets.packages.len(), 1);
    }

    #[test]
    fn test_configurable_detector_receives_config() {
        let mut det = FakeDetector::new("go-bin", DetectorKind::Package);
        det.configurable = true;
        let mut opts = RegistryOptions::default();
        opts.configs
            .insert("go-bin".into(), serde_json::json!({"deep": true}));
        let sets = DetectorSets::build(vec![eco("a", vec![det])], &opts).unwrap();
        assert_eq!(sets.packages.len(), 1);
    }

    #[tokio::test]
    async fn test_runtime_coalescer_is_callable() {
        let sets = DetectorSets::build(
            vec![eco("a", vec![FakeDetector::new("rpm", DetectorKind::Package)])],
            &RegistryOptions::default(),
        )
        .unwrap();
        let report = sets.ecosystems[0]
            .coalescer
            .coalesce(
                &layerbom_core::Digest::sha256_of(b"m"),
                &[] as &[LayerArtifacts],
                &CoalesceOptions::default(),
            )
            .await
            .unwrap();
        assert!(report.packages.is_empty());
    }
}
