//! Alpine Linux support for LayerBOM
//!
//! The apk version grammar, alpine-release distribution detection, the
//! branch-scoped matcher, and secdb updater construction. The apk
//! installed-database parser is supplied by the caller, like every other
//! on-disk format.

mod matcher;
mod release;
mod version;

pub use matcher::AlpineMatcher;
pub use release::{detect_branch, AlpineDetector};
pub use version::{compare, is_version_affected};

use layerbom_core::Distribution;
use layerbom_index::{Detector, Ecosystem, LinuxCoalescer};
use layerbom_updaters::{SecdbUpdater, Updater};
use std::sync::Arc;

const SECDB_BASE: &str = "https://secdb.alpinelinux.org";

/// Branches with live secdb streams.
pub const SUPPORTED_BRANCHES: [&str; 6] = ["edge", "v3.20", "v3.19", "v3.18", "v3.17", "v3.16"];

/// The alpine ecosystem with the caller's package detectors.
pub fn ecosystem(package_detectors: Vec<Box<dyn Detector>>) -> Ecosystem {
    Ecosystem {
        name: "alpine",
        package_detectors,
        distribution_detectors: vec![Box::new(AlpineDetector)],
        repository_detectors: vec![],
        coalescer: Box::new(LinuxCoalescer::new()),
    }
}

/// One secdb updater per branch and repository stream.
pub fn branch_updaters(client: reqwest::Client) -> Vec<Arc<dyn Updater>> {
    let mut updaters: Vec<Arc<dyn Updater>> = Vec::new();
    for branch in SUPPORTED_BRANCHES {
        for repo in ["main", "community"] {
            let dist = Distribution {
                id: branch.to_string(),
                did: "alpine".to_string(),
                name: "Alpine Linux".to_string(),
                ..Default::default()
            };
            updaters.push(Arc::new(
                SecdbUpdater::new(
                    format!("alpine-{branch}-{repo}"),
                    client.clone(),
                    format!("{SECDB_BASE}/{branch}/{repo}.json"),
                )
                .with_distribution(dist),
            ));
        }
    }
    updaters
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_index::{DetectorSets, RegistryOptions};

    #[test]
    fn test_ecosystem_builds() {
        let sets = DetectorSets::build(vec![ecosystem(vec![])], &RegistryOptions::default()).unwrap();
        assert_eq!(sets.distributions.len(), 1);
        assert_eq!(sets.distributions[0].name(), "alpine-release");
    }

    #[test]
    fn test_branch_updaters_cover_both_repos() {
        let updaters = branch_updaters(reqwest::Client::new());
        assert_eq!(updaters.len(), SUPPORTED_BRANCHES.len() * 2);
        assert!(updaters.iter().any(|u| u.name() == "alpine-v3.19-main"));
        assert!(updaters.iter().any(|u| u.name() == "alpine-edge-community"));
    }
}
