//! Distribution detection from release files
//!
//! Reads `etc/os-release` (or the `usr/lib` fallback) and, for images old
//! enough to predate it, `etc/redhat-release`. Distributions are memoized
//! process-wide by their normalized version tag so repeated sightings
//! share one allocation.

use anyhow::Result;
use async_trait::async_trait;
use layerbom_core::{distribution_for, DetectorKind, Distribution, Layer};
use layerbom_index::{Artifacts, Detector};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

const OS_RELEASE_PATHS: [&str; 2] = ["etc/os-release", "usr/lib/os-release"];
const REDHAT_RELEASE_PATH: &str = "etc/redhat-release";

fn redhat_release_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Red Hat Enterprise Linux.*?(\d+)(?:\.(\d+))?").expect("static regex")
    })
}

/// Parse the `KEY=value` lines of an os-release file.
pub fn parse_os_release(content: &str) -> Distribution {
    let mut dist = Distribution::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim_matches('"').trim_matches('\'');
        match key {
            "NAME" => dist.name = value.to_string(),
            "ID" => dist.did = value.to_lowercase(),
            "VERSION" => dist.version = value.to_string(),
            "VERSION_ID" => dist.version_id = value.to_string(),
            "PRETTY_NAME" => dist.pretty_name = value.to_string(),
            "CPE_NAME" => match layerbom_cpe::parse(value) {
                Ok(wfn) => dist.cpe = wfn.to_fstring(),
                Err(e) => warn!("unparsable CPE_NAME {value:?}: {e}"),
            },
            _ => {}
        }
    }
    // The release identity is the major version.
    dist.id = dist
        .version_id
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string();
    dist
}

/// Parse a legacy `redhat-release` banner.
pub fn parse_redhat_release(content: &str) -> Option<Distribution> {
    let caps = redhat_release_re().captures(content)?;
    let major = caps.get(1)?.as_str();
    let version_id = match caps.get(2) {
        Some(minor) => format!("{major}.{}", minor.as_str()),
        None => major.to_string(),
    };
    Some(Distribution {
        id: major.to_string(),
        did: "rhel".to_string(),
        name: "Red Hat Enterprise Linux Server".to_string(),
        version: version_id.clone(),
        version_id,
        pretty_name: content.trim().to_string(),
        cpe: String::new(),
    })
}

/// The Red-Hat-family distribution detector.
#[derive(Debug, Default)]
pub struct DistributionDetector;

#[async_trait]
impl Detector for DistributionDetector {
    fn name(&self) -> &str {
        "rhel-os-release"
    }

    fn version(&self) -> &str {
        "2"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Distribution
    }

    async fn scan(&self, layer: &Layer) -> Result<Artifacts> {
        for path in OS_RELEASE_PATHS {
            if !layer.contains(path) {
                continue;
            }
            let content = layer.read_to_string(path)?;
            let parsed = parse_os_release(&content);
            if parsed.did.is_empty() {
                continue;
            }
            debug!("layer {}: {} {}", layer.digest(), parsed.did, parsed.version_id);
            let tag = format!("{}-{}", parsed.did, parsed.version_id);
            let memoized = distribution_for(&tag, || parsed);
            return Ok(Artifacts::Distributions(vec![(*memoized).clone()]));
        }

        if layer.contains(REDHAT_RELEASE_PATH) {
            let content = layer.read_to_string(REDHAT_RELEASE_PATH)?;
            if let Some(parsed) = parse_redhat_release(&content) {
                let tag = format!("{}-{}", parsed.did, parsed.version_id);
                let memoized = distribution_for(&tag, || parsed);
                return Ok(Artifacts::Distributions(vec![(*memoized).clone()]));
            }
        }

        Ok(Artifacts::Distributions(vec![]))
    }
}
