//! Layer realization contract
//!
//! Byte transport is an external collaborator. The controller hands the
//! fetcher the references it needs realized; the fetcher yields read-only
//! layer handles backed by local disk. Implementations must verify the
//! content hash of whatever they fetch and fail the whole realization on
//! mismatch.

use crate::Detector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use layerbom_core::{Digest, Layer, LayerRef};
use layerbom_store::IndexStore;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait LayerFetcher: Send + Sync {
    /// Realize the given references, in order. Hash mismatch is fatal.
    async fn realize(&self, refs: &[LayerRef]) -> Result<Vec<Layer>>;
}

/// A fetcher over layers that already exist on local disk, keyed by
/// digest. Used by tests and air-gapped runs where extraction happened
/// out of band.
#[derive(Default)]
pub struct StaticFetcher {
    layers: HashMap<Digest, Layer>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: Layer) {
        self.layers.insert(layer.digest().clone(), layer);
    }
}

#[async_trait]
impl LayerFetcher for StaticFetcher {
    async fn realize(&self, refs: &[LayerRef]) -> Result<Vec<Layer>> {
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            match self.layers.get(&r.digest) {
                Some(layer) => out.push(layer.clone()),
                None => bail!("no local layer for {}", r.digest),
            }
        }
        Ok(out)
    }
}

/// Compute the set of layers still needing at least one detector pass.
///
/// For each detector × layer the store is asked for a completion mark; a
/// layer joins the fetch set when any configured detector has not finished
/// it. Duplicate digests collapse to their first occurrence.
pub(crate) async fn reduce(
    store: &dyn IndexStore,
    detectors: &[Arc<dyn Detector>],
    layers: &[LayerRef],
) -> Result<Vec<LayerRef>> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for layer in layers {
        if !seen.insert(layer.digest.clone()) {
            continue;
        }
        for det in detectors {
            if !store.layer_scanned(&layer.digest, &det.info()).await? {
                out.push(layer.clone());
                break;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::DigestAlgorithm;

    #[tokio::test]
    async fn test_static_fetcher_missing_layer_is_fatal() {
        let fetcher = StaticFetcher::new();
        let digest = Digest::new(DigestAlgorithm::Sha256, vec![0u8; 32]).unwrap();
        let refs = [LayerRef { digest, uri: None }];
        assert!(fetcher.realize(&refs).await.is_err());
    }
}
