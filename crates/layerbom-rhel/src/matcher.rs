//! Red-Hat-family matcher
//!
//! Eligibility is CPE-repository scoped: records carrying a repository
//! under the `rhel-cpe-repository` key, or a rhel distribution, are of
//! interest. The vulnerability test unmarshals the advisory's repository
//! name as a CPE and requires the strict superset relation, falling back
//! to a string-prefix relaxation for the product streams Red Hat publishes
//! truncated CPEs for.

use crate::evr::Evr;
use anyhow::Result;
use layerbom_core::{IndexRecord, Vulnerability};
use layerbom_match::{arch_matches, Matcher};
use layerbom_store::MatchConstraint;
use tracing::trace;

/// Repository key under which OS-vendor CPE repositories are recorded.
pub const REPOSITORY_KEY: &str = "rhel-cpe-repository";

const QUERY: [MatchConstraint; 2] = [MatchConstraint::PackageModule, MatchConstraint::RepositoryKey];

/// The RHEL-family matcher.
#[derive(Debug, Default)]
pub struct RhelMatcher;

impl RhelMatcher {
    pub fn new() -> Self {
        RhelMatcher
    }
}

/// Strip the `:*` padding a formatted string carries for ANY attributes.
fn strip_any_padding(fstring: &str) -> &str {
    let mut s = fstring;
    while let Some(stripped) = s.strip_suffix(":*") {
        s = stripped;
    }
    s
}

/// Strict superset, then the vendor prefix relaxation: the record's bound
/// string begins with the vulnerability's bound string once ANY padding is
/// stripped.
fn cpe_compatible(vuln_cpe: &str, record_cpe: &str) -> bool {
    let (Ok(vuln_wfn), Ok(record_wfn)) = (
        layerbom_cpe::parse(vuln_cpe),
        layerbom_cpe::parse(record_cpe),
    ) else {
        return false;
    };
    if layerbom_cpe::is_superset(&vuln_wfn, &record_wfn) {
        return true;
    }
    let vuln_fs = vuln_wfn.to_fstring();
    let record_fs = record_wfn.to_fstring();
    record_fs.starts_with(strip_any_padding(&vuln_fs))
}

impl Matcher for RhelMatcher {
    fn name(&self) -> &str {
        "rhel"
    }

    fn filter(&self, record: &IndexRecord) -> bool {
        record
            .repository
            .as_ref()
            .is_some_and(|r| r.key == REPOSITORY_KEY)
            || record.distribution.as_ref().is_some_and(|d| d.did == "rhel")
    }

    fn query(&self) -> &[MatchConstraint] {
        &QUERY
    }

    fn vulnerable(&self, record: &IndexRecord, vuln: &Vulnerability) -> Result<bool> {
        // Repository scoping: the advisory's repository name is a CPE.
        if let Some(vuln_repo) = &vuln.repo {
            let Some(record_repo) = &record.repository else {
                return Ok(false);
            };
            if !cpe_compatible(&vuln_repo.name, &record_repo.cpe) {
                trace!(
                    "repo cpe mismatch: {} vs {}",
                    vuln_repo.name,
                    record_repo.cpe
                );
                return Ok(false);
            }
        }

        // Architecture constraint.
        let vuln_arch = vuln.package.as_ref().map(|p| p.arch.as_str()).unwrap_or("");
        if !arch_matches(vuln.arch_operation, &record.package.arch, vuln_arch)? {
            return Ok(false);
        }

        // Version comparison under the RPM grammar.
        let record_evr = Evr::parse(&record.package.version);
        if vuln.fixed() {
            return Ok(record_evr < Evr::parse(&vuln.fixed_in_version));
        }
        // Unfixed: the advisory's package version is the last known
        // vulnerable one; absent any bound, everything is vulnerable.
        let last_known = vuln
            .package
            .as_ref()
            .map(|p| p.version.as_str())
            .unwrap_or("");
        if last_known.is_empty() {
            return Ok(true);
        }
        Ok(record_evr <= Evr::parse(last_known))
    }
}
