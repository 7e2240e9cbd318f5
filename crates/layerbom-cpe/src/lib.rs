//! CPE Well-Formed Names
//!
//! A WFN is a fixed 11-tuple of attribute values (part, vendor, product,
//! version, update, edition, language, sw_edition, target_sw, target_hw,
//! other). Each value is unset, ANY, NA, or a quoted string. This crate
//! parses and emits the two standard bindings — the CPE 2.3 formatted
//! string and the CPE 2.2 URI — and implements the attribute-wise
//! superset relation used by matchers.

mod compare;
mod fstring;
mod uri;
mod value;
mod wfn;

pub use compare::{compare, is_superset, Relation};
pub use value::{Value, ValueError};
pub use wfn::{Attribute, Wfn};

use thiserror::Error;

/// Errors parsing or binding a CPE.
#[derive(Debug, Error)]
pub enum CpeError {
    #[error("not a CPE binding: {0:?}")]
    UnknownPrefix(String),
    #[error("formatted string has {0} attributes, expected 11")]
    WrongArity(usize),
    #[error("URI has {0} components, expected at most 7")]
    TooManyComponents(usize),
    #[error("packed edition has {0} subfields, expected 6")]
    BadPackedEdition(usize),
    #[error("bad percent escape {escape:?} in {component:?}")]
    BadPercentEscape { escape: String, component: String },
    #[error("bad value in attribute {attribute}: {source}")]
    BadValue {
        attribute: &'static str,
        source: ValueError,
    },
    #[error("part must be one of a, o, h; got {0:?}")]
    BadPart(String),
}

/// Parse either binding, deciding by prefix.
pub fn parse(s: &str) -> Result<Wfn, CpeError> {
    if s.starts_with("cpe:2.3:") {
        fstring::unbind(s)
    } else if s.starts_with("cpe:/") {
        uri::unbind(s)
    } else {
        Err(CpeError::UnknownPrefix(s.to_string()))
    }
}

impl Wfn {
    /// Bind to the CPE 2.3 formatted string. This is the canonical string
    /// form used across reports and stores.
    pub fn to_fstring(&self) -> String {
        fstring::bind(self)
    }

    /// Bind to the CPE 2.2 URI.
    pub fn to_uri(&self) -> String {
        uri::bind(self)
    }
}
