//! The matching core
//!
//! Flattens a finished `IndexReport` into `(package, distribution,
//! repository)` records, asks each matcher which records it cares about,
//! seeks candidate vulnerabilities through the store under the matcher's
//! declared constraints, and composes the final `VulnerabilityReport`.

use anyhow::{Context, Result};
use layerbom_core::{ArchOp, IndexRecord, IndexReport, Vulnerability, VulnerabilityReport};
use layerbom_store::{MatchConstraint, VulnStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine-level matching options.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Never consider advisories without a fixed version.
    pub ignore_unpatched: bool,
}

/// One distribution family's matching logic.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &str;

    /// Records this matcher is interested in (by repository key,
    /// distribution id, and so on).
    fn filter(&self, record: &IndexRecord) -> bool;

    /// Constraints the store must apply when seeking candidates. Package
    /// name is always implied.
    fn query(&self) -> &[MatchConstraint];

    /// The decisive test: does this candidate vulnerability apply to this
    /// record?
    fn vulnerable(&self, record: &IndexRecord, vuln: &Vulnerability) -> Result<bool>;
}

/// Evaluate a vulnerability's declarative architecture constraint.
pub fn arch_matches(op: ArchOp, record_arch: &str, vuln_arch: &str) -> Result<bool> {
    match op {
        ArchOp::None => Ok(true),
        ArchOp::Equals => Ok(record_arch == vuln_arch),
        ArchOp::Pattern => {
            let re = regex::Regex::new(vuln_arch)
                .with_context(|| format!("bad architecture pattern {vuln_arch:?}"))?;
            Ok(re.is_match(record_arch))
        }
    }
}

/// Flatten a report into records, one per package × environment sighting.
fn flatten(report: &IndexReport) -> Vec<(String, IndexRecord)> {
    let mut records = Vec::new();
    for (id, package) in &report.packages {
        let envs = report.environments.get(id);
        let Some(envs) = envs.filter(|e| !e.is_empty()) else {
            records.push((
                id.clone(),
                IndexRecord {
                    package: package.clone(),
                    distribution: None,
                    repository: None,
                },
            ));
            continue;
        };
        for env in envs {
            let distribution = report.distributions.get(&env.distribution_id).cloned();
            if env.repository_ids.is_empty() {
                records.push((
                    id.clone(),
                    IndexRecord {
                        package: package.clone(),
                        distribution: distribution.clone(),
                        repository: None,
                    },
                ));
                continue;
            }
            for repo_id in &env.repository_ids {
                records.push((
                    id.clone(),
                    IndexRecord {
                        package: package.clone(),
                        distribution: distribution.clone(),
                        repository: report.repositories.get(repo_id).cloned(),
                    },
                ));
            }
        }
    }
    records
}

/// Correlate a finished index report against the vulnerability store.
pub async fn match_report(
    store: &dyn VulnStore,
    report: &IndexReport,
    matchers: &[Arc<dyn Matcher>],
    opts: &MatchOptions,
) -> Result<VulnerabilityReport> {
    let flattened = flatten(report);
    let mut out = VulnerabilityReport::from_index_report(report);

    for matcher in matchers {
        let interesting: Vec<&(String, IndexRecord)> = flattened
            .iter()
            .filter(|(_, record)| matcher.filter(record))
            .collect();
        if interesting.is_empty() {
            continue;
        }
        debug!(
            "matcher {}: {} of {} records eligible",
            matcher.name(),
            interesting.len(),
            flattened.len()
        );

        let records: Vec<IndexRecord> = interesting.iter().map(|(_, r)| r.clone()).collect();
        let candidates = store
            .get(&records, matcher.query(), opts.ignore_unpatched)
            .await
            .with_context(|| format!("seeking candidates for matcher {}", matcher.name()))?;

        for (idx, vulns) in candidates {
            let (package_id, record) = interesting[idx];
            for vuln in vulns {
                match matcher.vulnerable(record, &vuln) {
                    Ok(true) => {
                        let ids = out.package_vulnerabilities.entry(package_id.clone()).or_default();
                        if !ids.contains(&vuln.id) {
                            ids.push(vuln.id.clone());
                        }
                        out.vulnerabilities.insert(vuln.id.clone(), vuln);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        // A malformed advisory record must not sink the
                        // whole report.
                        warn!(
                            "matcher {}: skipping {} for {}: {e:#}",
                            matcher.name(),
                            vuln.name,
                            record.package.name
                        );
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::{Digest, Environment, Package, Severity};
    use layerbom_store::MemoryStore;

    struct NameMatcher;

    impl Matcher for NameMatcher {
        fn name(&self) -> &str {
            "name-only"
        }
        fn filter(&self, _record: &IndexRecord) -> bool {
            true
        }
        fn query(&self) -> &[MatchConstraint] {
            &[]
        }
        fn vulnerable(&self, _record: &IndexRecord, _vuln: &Vulnerability) -> Result<bool> {
            Ok(true)
        }
    }

    fn report_with_bash() -> IndexReport {
        let mut report = IndexReport::new(Digest::sha256_of(b"m"));
        report.packages.insert(
            "1".into(),
            Package {
                id: "1".into(),
                name: "bash".into(),
                version: "4.4.19-12.el8".into(),
                arch: "x86_64".into(),
                package_db: "var/lib/rpm".into(),
                ..Default::default()
            },
        );
        report.environments.insert(
            "1".into(),
            vec![Environment {
                package_db: "var/lib/rpm".into(),
                introduced_in: Digest::sha256_of(b"l1"),
                distribution_id: String::new(),
                repository_ids: vec![],
            }],
        );
        report
    }

    async fn store_with_vuln(fixed: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .update_vulnerabilities(
                "test-updater",
                "fp",
                vec![Vulnerability {
                    name: "CVE-2024-0001".into(),
                    severity: "Important".into(),
                    normalized_severity: Severity::High,
                    package: Some(Package {
                        name: "bash".into(),
                        ..Default::default()
                    }),
                    fixed_in_version: fixed.into(),
                    ..Default::default()
                }],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_engine_composes_report() {
        let store = store_with_vuln("4.4.20-1.el8").await;
        let report = report_with_bash();
        let matchers: Vec<Arc<dyn Matcher>> = vec![Arc::new(NameMatcher)];
        let vr = match_report(&store, &report, &matchers, &MatchOptions::default())
            .await
            .unwrap();
        assert_eq!(vr.vulnerabilities.len(), 1);
        let ids = &vr.package_vulnerabilities["1"];
        assert_eq!(ids.len(), 1);
        assert!(vr.vulnerabilities.contains_key(&ids[0]));
        // IndexReport fields carry over verbatim.
        assert_eq!(vr.packages.len(), report.packages.len());
        assert_eq!(vr.manifest, report.manifest);
    }

    #[tokio::test]
    async fn test_ignore_unpatched_drops_unfixed_advisories() {
        let store = store_with_vuln("").await;
        let report = report_with_bash();
        let matchers: Vec<Arc<dyn Matcher>> = vec![Arc::new(NameMatcher)];
        let vr = match_report(
            &store,
            &report,
            &matchers,
            &MatchOptions {
                ignore_unpatched: true,
            },
        )
        .await
        .unwrap();
        assert!(vr.vulnerabilities.is_empty());
        assert!(vr.package_vulnerabilities.is_empty());
    }

    #[test]
    fn test_arch_matches_operations() {
        assert!(arch_matches(ArchOp::None, "x86_64", "").unwrap());
        assert!(arch_matches(ArchOp::Equals, "x86_64", "x86_64").unwrap());
        assert!(!arch_matches(ArchOp::Equals, "aarch64", "x86_64").unwrap());
        assert!(arch_matches(ArchOp::Pattern, "x86_64", "x86_64|i686").unwrap());
        assert!(!arch_matches(ArchOp::Pattern, "s390x", "x86_64|i686").unwrap());
        assert!(arch_matches(ArchOp::Pattern, "anything", ".*").unwrap());
    }

    #[test]
    fn test_flatten_emits_record_per_sighting() {
        let mut report = report_with_bash();
        report.environments.get_mut("1").unwrap()[0]
            .repository_ids
            .extend(["10".to_string(), "11".to_string()]);
        report.repositories.insert(
            "10".into(),
            layerbom_core::Repository {
                id: "10".into(),
                name: "baseos".into(),
                ..Default::default()
            },
        );
        // Repository 11 is referenced but was never discovered; the record
        // still flattens with an empty repository.
        let records = flatten(&report);
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|(_, r)| r.repository.is_some()));
        assert!(records.iter().any(|(_, r)| r.repository.is_none()));
    }
}
