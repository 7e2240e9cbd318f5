//! The orchestration loop
//!
//! One run per updater: take the distributed lock (skip when contended),
//! read the previous fingerprint, fetch with retry, parse, apply. Across
//! updaters runs are independent and overlap; within one run the steps
//! are strictly sequential. A parse failure surfaces without advancing
//! the fingerprint.

use crate::{Delta, DeltaUpdater, Fetched, Updater};
use anyhow::{Context, Result};
use futures::future::join_all;
use layerbom_store::{UpdateDiff, UpdaterLock, VulnStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry/backoff knobs for transient transport failures.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Per-updater outcome of one driver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterStatus {
    /// Another process holds the lock; nothing was written.
    Skipped,
    /// The source reported no change; store left bit-identical.
    Unchanged,
    Updated(UpdateDiff),
}

/// Runs updaters against a vulnerability store.
pub struct UpdateDriver {
    store: Arc<dyn VulnStore>,
    lock: Arc<dyn UpdaterLock>,
    opts: UpdateOptions,
}

impl UpdateDriver {
    pub fn new(
        store: Arc<dyn VulnStore>,
        lock: Arc<dyn UpdaterLock>,
        opts: UpdateOptions,
    ) -> Self {
        UpdateDriver { store, lock, opts }
    }

    /// Run every updater, concurrently. Individual failures are logged
    /// and returned; one bad source does not stop the rest.
    pub async fn run_all(&self, updaters: &[Arc<dyn Updater>]) -> Vec<Result<UpdaterStatus>> {
        join_all(updaters.iter().map(|u| async {
            let result = self.run_one(u.as_ref()).await;
            if let Err(e) = &result {
                warn!("updater {} failed: {e:#}", u.name());
            }
            result
        }))
        .await
    }

    /// One full fetch-parse-apply pass for a single updater.
    pub async fn run_one(&self, updater: &dyn Updater) -> Result<UpdaterStatus> {
        let name = updater.name();
        let Some(_guard) = self.lock.try_lock(name).await? else {
            info!("updater {name}: lock contended, skipping");
            return Ok(UpdaterStatus::Skipped);
        };

        let prev = self
            .store
            .get_update_fingerprint(name)
            .await?
            .unwrap_or_default();

        let fetched = self
            .fetch_with_retry(|| updater.fetch(&prev))
            .await
            .with_context(|| format!("updater {name}: fetch failed"))?;
        let (body, fingerprint) = match fetched {
            Fetched::Unchanged => {
                info!("updater {name}: unchanged");
                return Ok(UpdaterStatus::Unchanged);
            }
            Fetched::Changed { body, fingerprint } => (body, fingerprint),
        };

        let vulns = updater
            .parse(&body)
            .await
            .with_context(|| format!("updater {name}: parse failed"))?;
        let diff = self
            .store
            .update_vulnerabilities(name, &fingerprint, vulns)
            .await?;
        info!(
            "updater {name}: applied +{} -{} records",
            diff.added, diff.removed
        );
        Ok(UpdaterStatus::Updated(diff))
    }

    /// One differential pass for a change-index source.
    pub async fn run_delta(&self, updater: &dyn DeltaUpdater) -> Result<UpdaterStatus> {
        let name = updater.name();
        let Some(_guard) = self.lock.try_lock(name).await? else {
            info!("updater {name}: lock contended, skipping");
            return Ok(UpdaterStatus::Skipped);
        };

        let prev = self
            .store
            .get_update_fingerprint(name)
            .await?
            .unwrap_or_default();
        let delta = self
            .fetch_with_retry(|| updater.delta(&prev))
            .await
            .with_context(|| format!("updater {name}: delta fetch failed"))?;
        match delta {
            Delta::Unchanged => {
                info!("updater {name}: unchanged");
                Ok(UpdaterStatus::Unchanged)
            }
            Delta::Changed {
                added,
                deleted,
                fingerprint,
            } => {
                let diff = self
                    .store
                    .delta_update_vulnerabilities(name, &fingerprint, added, &deleted)
                    .await?;
                info!(
                    "updater {name}: merged +{} -{} advisories",
                    diff.added, diff.removed
                );
                Ok(UpdaterStatus::Updated(diff))
            }
        }
    }

    /// Exponential backoff around transient transport failures.
    async fn fetch_with_retry<T, F, Fut>(&self, mut fetch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut backoff = self.opts.initial_backoff;
        let mut attempt = 0;
        loop {
            match fetch().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.opts.retries => {
                    attempt += 1;
                    warn!("fetch attempt {attempt} failed, retrying in {backoff:?}: {e:#}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
