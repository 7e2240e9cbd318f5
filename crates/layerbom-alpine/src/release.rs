//! Alpine release detection
//!
//! Prefers `etc/os-release`; older images only carry `etc/alpine-release`
//! with the bare version string. The branch (`v3.19`) is derived from the
//! major.minor pair and doubles as the advisory stream name.

use anyhow::Result;
use async_trait::async_trait;
use layerbom_core::{distribution_for, DetectorKind, Distribution, Layer};
use layerbom_index::{Artifacts, Detector};
use tracing::debug;

const OS_RELEASE: &str = "etc/os-release";
const ALPINE_RELEASE: &str = "etc/alpine-release";

/// Derive the secdb branch from a version string (`3.19.1` → `v3.19`).
pub fn detect_branch(version: &str) -> Option<String> {
    let mut parts = version.trim().split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor))
            if !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) =>
        {
            Some(format!("v{major}.{minor}"))
        }
        _ => None,
    }
}

fn distribution(version_id: &str) -> Distribution {
    Distribution {
        id: detect_branch(version_id).unwrap_or_else(|| "edge".to_string()),
        did: "alpine".to_string(),
        name: "Alpine Linux".to_string(),
        version: version_id.to_string(),
        version_id: version_id.to_string(),
        pretty_name: format!("Alpine Linux v{version_id}"),
        cpe: String::new(),
    }
}

/// Alpine distribution detector.
#[derive(Debug, Default)]
pub struct AlpineDetector;

#[async_trait]
impl Detector for AlpineDetector {
    fn name(&self) -> &str {
        "alpine-release"
    }

    fn version(&self) -> &str {
        "1"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Distribution
    }

    async fn scan(&self, layer: &Layer) -> Result<Artifacts> {
        let version_id = if layer.contains(OS_RELEASE) {
            let content = layer.read_to_string(OS_RELEASE)?;
            let mut id = None;
            let mut version_id = None;
            for line in content.lines() {
                match line.trim().split_once('=') {
                    Some(("ID", v)) => id = Some(v.trim_matches('"').to_lowercase()),
                    Some(("VERSION_ID", v)) => version_id = Some(v.trim_matches('"').to_string()),
                    _ => {}
                }
            }
            if id.as_deref() != Some("alpine") {
                return Ok(Artifacts::Distributions(vec![]));
            }
            version_id.unwrap_or_default()
        } else if layer.contains(ALPINE_RELEASE) {
            layer.read_to_string(ALPINE_RELEASE)?.trim().to_string()
        } else {
            return Ok(Artifacts::Distributions(vec![]));
        };

        debug!("layer {}: alpine {}", layer.digest(), version_id);
        let tag = format!("alpine-{version_id}");
        let memoized = distribution_for(&tag, || distribution(&version_id));
        Ok(Artifacts::Distributions(vec![(*memoized).clone()]))
    }
}
