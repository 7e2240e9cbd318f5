//! Update fingerprints
//!
//! The orchestrator treats fingerprints as opaque strings. Updaters that
//! track two entity tags plus a cursor serialize them as
//! `<etag-a>\<etag-b>\<RFC3339 timestamp>\<integer version>`; an
//! unparsable fingerprint is treated as empty, which forces a full fetch.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("expected 4 backslash-separated fields, got {0}")]
    WrongArity(usize),
    #[error("bad cursor timestamp: {0}")]
    BadTimestamp(#[from] time::error::Parse),
    #[error("bad format version: {0}")]
    BadVersion(String),
}

/// A composite fingerprint: two entity tags, a cursor, a format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub etag_a: String,
    pub etag_b: String,
    pub cursor: OffsetDateTime,
    pub version: u32,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Fingerprint {
            etag_a: String::new(),
            etag_b: String::new(),
            cursor: OffsetDateTime::UNIX_EPOCH,
            version: 0,
        }
    }
}

impl Fingerprint {
    /// Parse, treating any malformed input as the empty fingerprint.
    pub fn parse_or_empty(s: &str) -> Fingerprint {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('\\').collect();
        if fields.len() != 4 {
            return Err(FingerprintError::WrongArity(fields.len()));
        }
        let cursor = OffsetDateTime::parse(fields[2], &Rfc3339)?;
        let version = fields[3]
            .parse()
            .map_err(|_| FingerprintError::BadVersion(fields[3].to_string()))?;
        Ok(Fingerprint {
            etag_a: fields[0].to_string(),
            etag_b: fields[1].to_string(),
            cursor,
            version,
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = self
            .cursor
            .format(&Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(
            f,
            "{}\\{}\\{}\\{}",
            self.etag_a, self.etag_b, cursor, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_unchanged() {
        let s = "one\\two\\2006-01-02T15:04:05Z\\1";
        let fp: Fingerprint = s.parse().unwrap();
        assert_eq!(fp.etag_a, "one");
        assert_eq!(fp.etag_b, "two");
        assert_eq!(fp.version, 1);
        assert_eq!(fp.to_string(), s);
    }

    #[test]
    fn test_extra_separator_fails() {
        let err = "one\\tw\\o\\2006-01-02T15:04:05Z\\1"
            .parse::<Fingerprint>()
            .unwrap_err();
        assert!(matches!(err, FingerprintError::WrongArity(5)));
    }

    #[test]
    fn test_bad_timestamp_and_version_fail() {
        assert!(matches!(
            "a\\b\\not-a-time\\1".parse::<Fingerprint>(),
            Err(FingerprintError::BadTimestamp(_))
        ));
        assert!(matches!(
            "a\\b\\2006-01-02T15:04:05Z\\x".parse::<Fingerprint>(),
            Err(FingerprintError::BadVersion(_))
        ));
    }

    #[test]
    fn test_unparsable_is_empty() {
        let fp = Fingerprint::parse_or_empty("garbage");
        assert_eq!(fp, Fingerprint::default());
        assert_eq!(fp.cursor, OffsetDateTime::UNIX_EPOCH);
    }
}
