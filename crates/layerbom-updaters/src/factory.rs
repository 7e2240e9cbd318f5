//! Updater-set factories
//!
//! A factory probes a remote source to enumerate its sub-streams (one per
//! OS major release, typically) and yields the updater set. Probes are
//! conditional-request friendly: each stream's entity tag is remembered
//! and advanced only when a probe succeeds.

use crate::Updater;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[async_trait]
pub trait UpdaterSetFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Enumerate the currently-available updaters.
    async fn updaters(&self) -> Result<Vec<Arc<dyn Updater>>>;
}

type MakeUpdater = Box<dyn Fn(u32, String) -> Arc<dyn Updater> + Send + Sync>;

/// Probes one URL per major release with HEAD requests.
pub struct ReleaseStreamFactory {
    name: String,
    client: reqwest::Client,
    /// URL template with `{}` standing for the major release number.
    url_template: String,
    majors: Vec<u32>,
    etags: Mutex<HashMap<u32, String>>,
    make: MakeUpdater,
}

impl ReleaseStreamFactory {
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        url_template: impl Into<String>,
        majors: Vec<u32>,
        make: MakeUpdater,
    ) -> Self {
        ReleaseStreamFactory {
            name: name.into(),
            client,
            url_template: url_template.into(),
            majors,
            etags: Mutex::new(HashMap::new()),
            make,
        }
    }

    fn stream_url(&self, major: u32) -> String {
        self.url_template.replace("{}", &major.to_string())
    }
}

#[async_trait]
impl UpdaterSetFactory for ReleaseStreamFactory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn updaters(&self) -> Result<Vec<Arc<dyn Updater>>> {
        let mut out = Vec::new();
        for &major in &self.majors {
            let url = self.stream_url(major);
            let prev_etag = self
                .etags
                .lock()
                .expect("factory etags poisoned")
                .get(&major)
                .cloned();

            let mut req = self.client.head(&url);
            if let Some(etag) = &prev_etag {
                req = req.header(header::IF_NONE_MATCH, etag);
            }
            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    // A probe failure leaves the stream out of this round
                    // without advancing its state.
                    warn!("{}: probe for major {major} failed: {e}", self.name);
                    continue;
                }
            };
            match resp.status() {
                StatusCode::NOT_MODIFIED => {
                    out.push((self.make)(major, url));
                }
                StatusCode::NOT_FOUND => {
                    debug!("{}: no stream for major {major}", self.name);
                }
                status if status.is_success() => {
                    if let Some(etag) = resp
                        .headers()
                        .get(header::ETAG)
                        .and_then(|v| v.to_str().ok())
                    {
                        self.etags
                            .lock()
                            .expect("factory etags poisoned")
                            .insert(major, etag.to_string());
                    }
                    out.push((self.make)(major, url));
                }
                status => {
                    warn!("{}: probe for major {major} returned {status}", self.name);
                }
            }
        }
        Ok(out)
    }
}
