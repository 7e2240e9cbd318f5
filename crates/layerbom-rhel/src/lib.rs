//! Red-Hat-family support for LayerBOM
//!
//! Everything specific to the RHEL lineage (RHEL, CentOS, Alma, Rocky):
//! the RPM version grammar, release-file distribution detection, RPM
//! database discovery, and the CPE-scoped matcher. The ecosystem bundle
//! wires these into the indexer; the package detector that actually reads
//! an RPM database is supplied by the caller, since database parsing is a
//! transport concern.

mod evr;
mod matcher;
mod release;
mod rpmdb;

pub use evr::{rpmvercmp, Evr};
pub use matcher::{RhelMatcher, REPOSITORY_KEY};
pub use release::{parse_os_release, parse_redhat_release, DistributionDetector};
pub use rpmdb::{find_databases, RpmDbKind};

use layerbom_index::{Coalescer, Detector, Ecosystem, LinuxCoalescer};

/// The rhel ecosystem with the caller's package and repository detectors.
///
/// Distribution detection and the coalescer (with DNF repo-id annotation)
/// are provided here; RPM database parsing arrives from outside.
pub fn ecosystem(
    package_detectors: Vec<Box<dyn Detector>>,
    repository_detectors: Vec<Box<dyn Detector>>,
) -> Ecosystem {
    Ecosystem {
        name: "rhel",
        package_detectors,
        distribution_detectors: vec![Box::new(DistributionDetector)],
        repository_detectors,
        coalescer: Box::new(LinuxCoalescer::with_dnf_annotation()) as Box<dyn Coalescer>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_index::{DetectorSets, RegistryOptions};

    #[test]
    fn test_ecosystem_builds_with_distribution_detector() {
        let sets =
            DetectorSets::build(vec![ecosystem(vec![], vec![])], &RegistryOptions::default())
                .unwrap();
        assert_eq!(sets.distributions.len(), 1);
        assert_eq!(sets.distributions[0].name(), "rhel-os-release");
        assert!(sets.packages.is_empty());
    }
}
