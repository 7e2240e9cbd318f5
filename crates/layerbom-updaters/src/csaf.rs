//! Change-index (CSAF-style) differential updates
//!
//! Sources in this family publish `changes.csv` and `deletions.csv` at the
//! repository root, each line naming an advisory document and its
//! modification time. Instead of refetching the world, the updater pulls
//! the indexes conditionally, fetches only documents newer than the cursor
//! in its previous fingerprint, and tombstones deleted advisory names.

use crate::fingerprint::Fingerprint;
use crate::http::{Fetched, HttpFetcher};
use crate::{convert_advisories, Delta, DeltaUpdater, RawAdvisory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use layerbom_core::Vulnerability;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Bumped when the fingerprint layout changes; old fingerprints then parse
/// but force a full refetch through the epoch cursor.
pub const FINGERPRINT_VERSION: u32 = 1;

type DocumentParser = Box<dyn Fn(&[u8]) -> Result<Vec<Vulnerability>> + Send + Sync>;

/// A differential updater over a change-index repository.
pub struct CsafUpdater {
    name: String,
    client: reqwest::Client,
    base: String,
    parse_document: DocumentParser,
}

impl CsafUpdater {
    /// Documents are decoded as normalized advisory JSON by default.
    pub fn new(name: impl Into<String>, client: reqwest::Client, base: impl Into<String>) -> Self {
        Self::with_document_parser(
            name,
            client,
            base,
            Box::new(|body| {
                let raw: Vec<RawAdvisory> =
                    serde_json::from_slice(body).context("decoding advisory document")?;
                Ok(convert_advisories(raw))
            }),
        )
    }

    /// Supply a source-specific document parser.
    pub fn with_document_parser(
        name: impl Into<String>,
        client: reqwest::Client,
        base: impl Into<String>,
        parse_document: DocumentParser,
    ) -> Self {
        let base = base.into();
        CsafUpdater {
            name: name.into(),
            client,
            base: base.trim_end_matches('/').to_string(),
            parse_document,
        }
    }

    fn index_fetcher(&self, file: &str) -> HttpFetcher {
        HttpFetcher::new(self.client.clone(), format!("{}/{file}", self.base))
    }
}

/// Parse a change-index CSV: `"<path>","<RFC3339 time>"` per line, one
/// entry per changed advisory. Entries at or before `since` are dropped;
/// malformed lines are skipped.
pub fn parse_changes_csv(content: &str, since: OffsetDateTime) -> Vec<(String, OffsetDateTime)> {
    parse_index_csv(content, since)
}

/// Parse a deletions CSV: `"<advisory name>","<RFC3339 time>"` per line.
pub fn parse_deletions_csv(content: &str, since: OffsetDateTime) -> Vec<(String, OffsetDateTime)> {
    parse_index_csv(content, since)
}

fn parse_index_csv(content: &str, since: OffsetDateTime) -> Vec<(String, OffsetDateTime)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((first, second)) = line.split_once(',') else {
            warn!("skipping malformed index line {line:?}");
            continue;
        };
        let entry = first.trim().trim_matches('"');
        let stamp = second.trim().trim_matches('"');
        match OffsetDateTime::parse(stamp, &Rfc3339) {
            Ok(ts) if ts > since => out.push((entry.to_string(), ts)),
            Ok(_) => {}
            Err(e) => warn!("skipping index line with bad timestamp {stamp:?}: {e}"),
        }
    }
    out
}

#[async_trait]
impl DeltaUpdater for CsafUpdater {
    fn name(&self) -> &str {
        &self.name
    }

    async fn delta(&self, prev_fingerprint: &str) -> Result<Delta> {
        let prev = Fingerprint::parse_or_empty(prev_fingerprint);

        let changes = self
            .index_fetcher("changes.csv")
            .fetch(&prev.etag_a)
            .await
            .context("fetching changes index")?;
        let deletions = self
            .index_fetcher("deletions.csv")
            .fetch(&prev.etag_b)
            .await
            .context("fetching deletions index")?;
        if matches!((&changes, &deletions), (Fetched::Unchanged, Fetched::Unchanged)) {
            return Ok(Delta::Unchanged);
        }

        let mut cursor = prev.cursor;
        let mut added = Vec::new();
        let mut deleted = Vec::new();
        let mut etag_a = prev.etag_a.clone();
        let mut etag_b = prev.etag_b.clone();

        if let Fetched::Changed { body, fingerprint } = changes {
            etag_a = fingerprint;
            let content = String::from_utf8_lossy(&body);
            for (path, ts) in parse_changes_csv(&content, prev.cursor) {
                let url = format!("{}/{path}", self.base);
                debug!("{}: fetching changed advisory {path}", self.name);
                let doc = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("fetching advisory {url}"))?
                    .bytes()
                    .await
                    .with_context(|| format!("reading advisory {url}"))?;
                added.extend((self.parse_document)(&doc)?);
                cursor = cursor.max(ts);
            }
        }

        if let Fetched::Changed { body, fingerprint } = deletions {
            etag_b = fingerprint;
            let content = String::from_utf8_lossy(&body);
            for (name, ts) in parse_deletions_csv(&content, prev.cursor) {
                deleted.push(name);
                cursor = cursor.max(ts);
            }
        }

        let fingerprint = Fingerprint {
            etag_a,
            etag_b,
            cursor,
            version: FINGERPRINT_VERSION,
        };
        Ok(Delta::Changed {
            added,
            deleted,
            fingerprint: fingerprint.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const CHANGES: &str = "\
\"2024/rhsa-2024_0001.json\",\"2024-01-02T03:04:05Z\"
\"2024/rhsa-2024_0002.json\",\"2024-03-01T00:00:00Z\"
\"2023/rhsa-2023_9999.json\",\"2023-06-01T00:00:00Z\"
not,a-timestamp
";

    #[test]
    fn test_changes_csv_filters_by_cursor() {
        let since = datetime!(2024-01-01 00:00:00 UTC);
        let entries = parse_changes_csv(CHANGES, since);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "2024/rhsa-2024_0001.json");
        assert_eq!(entries[1].0, "2024/rhsa-2024_0002.json");
    }

    #[test]
    fn test_changes_csv_epoch_cursor_takes_everything_valid() {
        let entries = parse_changes_csv(CHANGES, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_deletions_csv_names() {
        let content = "\"RHSA-2020:1234\",\"2024-02-01T00:00:00Z\"\n";
        let since = datetime!(2024-01-01 00:00:00 UTC);
        let entries = parse_deletions_csv(content, since);
        assert_eq!(entries[0].0, "RHSA-2020:1234");
    }
}
