//! Layers and manifests
//!
//! A manifest is the ordered stack of layers that make up an image. Layer
//! byte transport is not this crate's problem: a `LayerRef` names a layer
//! that still has to be realized, and a `Layer` is the read-only handle a
//! fetch collaborator hands back once the bytes are on local disk.

use crate::digest::Digest;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A reference to a layer that has not been fetched yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerRef {
    pub digest: Digest,
    /// Where the bytes can be obtained. Opaque to the core; consumed by the
    /// fetch collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// The ordered stack of layers making up one image.
///
/// Order is significant. Duplicate digests within one manifest are allowed
/// and collapsed at scan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub digest: Digest,
    pub layers: Vec<LayerRef>,
}

#[derive(Debug)]
struct LayerInner {
    digest: Digest,
    root: PathBuf,
}

/// A realized layer: a digest plus the extracted filesystem root.
///
/// The handle is read-only and cheap to clone; detectors open files by
/// relative path under the extracted root.
#[derive(Debug, Clone)]
pub struct Layer {
    inner: Arc<LayerInner>,
}

impl Layer {
    pub fn new(digest: Digest, root: PathBuf) -> Self {
        Layer {
            inner: Arc::new(LayerInner { digest, root }),
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.inner.digest
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Resolve a path relative to the layer root. Absolute-looking paths
    /// are treated as relative to the root, matching how paths appear in
    /// layer tarballs.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        let rel = rel.as_ref();
        let rel = rel.strip_prefix("/").unwrap_or(rel);
        self.inner.root.join(rel)
    }

    /// Whether a file exists on this layer.
    pub fn contains(&self, rel: impl AsRef<Path>) -> bool {
        self.path(rel).is_file()
    }

    /// Read a whole file from the layer.
    pub fn read(&self, rel: impl AsRef<Path>) -> Result<Vec<u8>> {
        let p = self.path(rel.as_ref());
        std::fs::read(&p).with_context(|| format!("reading {} from layer {}", p.display(), self.digest()))
    }

    /// Read a whole file from the layer as UTF-8 text.
    pub fn read_to_string(&self, rel: impl AsRef<Path>) -> Result<String> {
        let p = self.path(rel.as_ref());
        std::fs::read_to_string(&p)
            .with_context(|| format!("reading {} from layer {}", p.display(), self.digest()))
    }
}

impl Manifest {
    /// Layer digests in manifest order, duplicates preserved.
    pub fn layer_digests(&self) -> impl Iterator<Item = &Digest> {
        self.layers.iter().map(|l| &l.digest)
    }
}
