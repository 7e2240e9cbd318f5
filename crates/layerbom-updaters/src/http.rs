//! Conditional HTTP fetching
//!
//! Fetchers derive their fingerprint from the response entity tag, falling
//! back to `Last-Modified` and finally a content hash, so every source
//! gets change detection even when its server is header-poor.

use anyhow::{bail, Context, Result};
use layerbom_core::Digest;
use reqwest::header;
use reqwest::StatusCode;
use tracing::debug;

/// Outcome of a conditional fetch.
pub enum Fetched {
    /// The source reports no change since the previous fingerprint.
    Unchanged,
    Changed {
        body: Vec<u8>,
        fingerprint: String,
    },
}

/// Conditional GET against one URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        HttpFetcher {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch, sending the previous fingerprint as a validator.
    pub async fn fetch(&self, prev_fingerprint: &str) -> Result<Fetched> {
        let mut req = self.client.get(&self.url);
        if !prev_fingerprint.is_empty() {
            // The fingerprint is whichever validator the last response
            // supplied; servers ignore one that is not theirs.
            req = req
                .header(header::IF_NONE_MATCH, prev_fingerprint)
                .header(header::IF_MODIFIED_SINCE, prev_fingerprint);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("fetching {}", self.url))?;

        if resp.status() == StatusCode::NOT_MODIFIED {
            debug!("{}: not modified", self.url);
            return Ok(Fetched::Unchanged);
        }
        if !resp.status().is_success() {
            bail!("fetching {}: status {}", self.url, resp.status());
        }

        let validator = resp
            .headers()
            .get(header::ETAG)
            .or_else(|| resp.headers().get(header::LAST_MODIFIED))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", self.url))?
            .to_vec();

        let fingerprint = match validator {
            Some(v) => v,
            None => Digest::sha256_of(&body).to_string(),
        };
        if !prev_fingerprint.is_empty() && fingerprint == prev_fingerprint {
            // Header-poor servers still short-circuit on the content hash.
            return Ok(Fetched::Unchanged);
        }
        Ok(Fetched::Changed { body, fingerprint })
    }
}
