//! Attribute values and the quoting grammar
//!
//! A set value is stored in its quoted form: alphanumerics and underscore
//! stand for themselves, every other printable character is
//! backslash-escaped, and unquoted `*` / `?` are wildcards restricted to
//! the ends of the value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One attribute of a WFN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Attribute was never assigned. Compares like `Any`.
    #[default]
    Unset,
    /// The logical ANY value.
    Any,
    /// The logical NA (not applicable) value.
    Na,
    /// A quoted string.
    Set(String),
}

/// Errors validating a quoted value.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("empty value")]
    Empty,
    #[error("whitespace and non-printable characters are forbidden")]
    BadCharacter,
    #[error("non-ASCII characters are forbidden")]
    NonAscii,
    #[error("dangling backslash")]
    DanglingEscape,
    #[error("alphanumerics may not be escaped")]
    EscapedAlnum,
    #[error("unquoted special character {0:?}")]
    UnquotedSpecial(char),
    #[error("asterisk allowed only at the start or end of a value")]
    MisplacedStar,
    #[error("question marks allowed only as runs at the start or end of a value")]
    MisplacedQuest,
    #[error("a lone asterisk is not a legal value")]
    LoneStar,
    #[error("a lone quoted hyphen is not a legal value")]
    LoneHyphen,
}

/// A quoted value decomposed for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tok {
    /// A literal character (escapes resolved).
    Char(char),
    /// Unquoted `*`: zero or more characters.
    Star,
    /// Unquoted `?`: exactly one character.
    Quest,
}

/// Tokenize a quoted string, resolving escapes. Does not enforce wildcard
/// placement; `validate` does.
pub(crate) fn tokenize(quoted: &str) -> Result<Vec<Tok>, ValueError> {
    if quoted.is_empty() {
        return Err(ValueError::Empty);
    }
    if !quoted.is_ascii() {
        return Err(ValueError::NonAscii);
    }
    let mut toks = Vec::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or(ValueError::DanglingEscape)?;
                if escaped.is_ascii_alphanumeric() {
                    return Err(ValueError::EscapedAlnum);
                }
                toks.push(Tok::Char(escaped));
            }
            '*' => toks.push(Tok::Star),
            '?' => toks.push(Tok::Quest),
            c if c.is_ascii_alphanumeric() || c == '_' => toks.push(Tok::Char(c)),
            c if c.is_ascii_whitespace() || c.is_ascii_control() => {
                return Err(ValueError::BadCharacter)
            }
            c => return Err(ValueError::UnquotedSpecial(c)),
        }
    }
    Ok(toks)
}

/// Validate a quoted string against the full value grammar.
pub fn validate(quoted: &str) -> Result<(), ValueError> {
    let toks = tokenize(quoted)?;

    if toks == [Tok::Star] {
        return Err(ValueError::LoneStar);
    }
    if toks == [Tok::Char('-')] {
        return Err(ValueError::LoneHyphen);
    }

    // Wildcards are legal only inside the leading and trailing runs, with
    // at most one asterisk in each.
    let leading = toks
        .iter()
        .take_while(|t| !matches!(t, Tok::Char(_)))
        .count();
    let trailing = toks
        .iter()
        .rev()
        .take_while(|t| !matches!(t, Tok::Char(_)))
        .count();
    let trailing_start = toks.len().saturating_sub(trailing);

    for (i, t) in toks.iter().enumerate() {
        let in_run = i < leading || i >= trailing_start;
        match t {
            Tok::Star if !in_run => return Err(ValueError::MisplacedStar),
            Tok::Quest if !in_run => return Err(ValueError::MisplacedQuest),
            _ => {}
        }
    }
    let stars = |run: &mut dyn Iterator<Item = &Tok>| run.filter(|t| **t == Tok::Star).count();
    if stars(&mut toks[..leading].iter()) > 1 || stars(&mut toks[trailing_start..].iter()) > 1 {
        return Err(ValueError::MisplacedStar);
    }
    Ok(())
}

impl Value {
    /// Build a set value from a quoted string, validating the grammar.
    pub fn set(quoted: impl Into<String>) -> Result<Value, ValueError> {
        let quoted = quoted.into();
        validate(&quoted)?;
        Ok(Value::Set(quoted))
    }

    /// Quote a plain string: every non-alphanumeric character other than
    /// underscore gets a backslash. The result carries no wildcards.
    pub fn quote(plain: &str) -> Value {
        let mut out = String::with_capacity(plain.len());
        for c in plain.chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
            } else {
                out.push('\\');
                out.push(c);
            }
        }
        Value::Set(out)
    }

    /// Whether this value carries an unquoted wildcard.
    pub fn has_wildcard(&self) -> bool {
        match self {
            Value::Set(s) => tokenize(s)
                .map(|t| t.iter().any(|t| matches!(t, Tok::Star | Tok::Quest)))
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_specials() {
        assert_eq!(Value::quote("8.4"), Value::Set(r"8\.4".into()));
        assert_eq!(Value::quote("enterprise_linux"), Value::Set("enterprise_linux".into()));
        assert_eq!(Value::quote("a:b"), Value::Set(r"a\:b".into()));
    }

    #[test]
    fn test_validate_wildcard_placement() {
        assert!(validate(r"openshift").is_ok());
        assert!(validate(r"*openshift*").is_ok());
        assert!(validate(r"??abc").is_ok());
        assert!(validate(r"abc??").is_ok());
        assert!(validate(r"ab*cd").is_err());
        assert!(validate(r"ab?cd").is_err());
        assert!(validate(r"**abc").is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        assert!(matches!(validate("*"), Err(ValueError::LoneStar)));
        assert!(matches!(validate(r"\-"), Err(ValueError::LoneHyphen)));
        assert!(matches!(validate(""), Err(ValueError::Empty)));
        assert!(matches!(validate("a b"), Err(ValueError::BadCharacter)));
        assert!(matches!(validate("caf\u{e9}"), Err(ValueError::NonAscii)));
        assert!(matches!(validate("a.b"), Err(ValueError::UnquotedSpecial('.'))));
        assert!(matches!(validate(r"a\"), Err(ValueError::DanglingEscape)));
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(Value::set("*abc").unwrap().has_wildcard());
        assert!(!Value::set(r"a\*bc").is_ok_and(|v| v.has_wildcard()));
        assert!(!Value::quote("plain*text").has_wildcard());
    }
}
