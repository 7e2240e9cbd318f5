//! Alpine matcher
//!
//! secdb advisories carry no severities and no repository CPEs; scoping is
//! by distribution branch, and the version test is the apk grammar. An
//! advisory without a fixed version is unresolved and matches every
//! installed version of the package.

use crate::version;
use anyhow::Result;
use layerbom_core::{IndexRecord, Vulnerability};
use layerbom_match::Matcher;
use layerbom_store::MatchConstraint;

const QUERY: [MatchConstraint; 1] = [MatchConstraint::DistributionId];

/// The Alpine matcher.
#[derive(Debug, Default)]
pub struct AlpineMatcher;

impl AlpineMatcher {
    pub fn new() -> Self {
        AlpineMatcher
    }
}

impl Matcher for AlpineMatcher {
    fn name(&self) -> &str {
        "alpine"
    }

    fn filter(&self, record: &IndexRecord) -> bool {
        record
            .distribution
            .as_ref()
            .is_some_and(|d| d.did == "alpine")
    }

    fn query(&self) -> &[MatchConstraint] {
        &QUERY
    }

    fn vulnerable(&self, record: &IndexRecord, vuln: &Vulnerability) -> Result<bool> {
        if !vuln.fixed() {
            return Ok(true);
        }
        Ok(version::is_version_affected(
            &record.package.version,
            &vuln.fixed_in_version,
        ))
    }
}
