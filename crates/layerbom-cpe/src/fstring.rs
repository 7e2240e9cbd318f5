//! CPE 2.3 formatted-string binding
//!
//! `cpe:2.3:` followed by the eleven attributes, colon-separated. `*` binds
//! ANY, `-` binds NA. Inside a value, `.` `-` `_` appear bare; every other
//! special character stays backslash-escaped; `*` and `?` pass through as
//! wildcards.

use crate::value::Value;
use crate::wfn::{Attribute, Wfn};
use crate::CpeError;

const PREFIX: &str = "cpe:2.3:";

// Characters that are escaped in a WFN value but appear bare in the
// formatted string.
fn bare_in_fstring(c: char) -> bool {
    matches!(c, '.' | '-' | '_')
}

fn bind_value(v: &Value) -> String {
    let quoted = match v {
        Value::Unset | Value::Any => return "*".to_string(),
        Value::Na => return "-".to_string(),
        Value::Set(q) => q,
    };
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            // Validated values never end in a dangling backslash.
            if let Some(escaped) = chars.next() {
                if bare_in_fstring(escaped) {
                    out.push(escaped);
                } else {
                    out.push('\\');
                    out.push(escaped);
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unbind_value(field: &str, attribute: &'static str) -> Result<Value, CpeError> {
    use crate::ValueError;
    let bad = |source| CpeError::BadValue { attribute, source };
    match field {
        "*" => return Ok(Value::Any),
        "-" => return Ok(Value::Na),
        "" => return Err(bad(ValueError::Empty)),
        _ => {}
    }
    let mut quoted = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| bad(ValueError::DanglingEscape))?;
                quoted.push('\\');
                quoted.push(escaped);
            }
            '*' | '?' => quoted.push(c),
            c if c.is_ascii_alphanumeric() || c == '_' => quoted.push(c),
            c if bare_in_fstring(c) => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => return Err(bad(ValueError::UnquotedSpecial(c))),
        }
    }
    Value::set(quoted).map_err(|source| CpeError::BadValue { attribute, source })
}

/// Bind a WFN to its formatted string.
pub(crate) fn bind(wfn: &Wfn) -> String {
    let mut out = String::from("cpe:2.3");
    for a in Attribute::ALL {
        out.push(':');
        out.push_str(&bind_value(wfn.attr(a)));
    }
    out
}

/// Split on unescaped colons.
fn split_fields(s: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;
    for c in s.chars() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                cur.push(c);
            }
            ':' if !escaped => {
                fields.push(std::mem::take(&mut cur));
            }
            _ => {
                escaped = false;
                cur.push(c);
            }
        }
    }
    fields.push(cur);
    fields
}

/// Unbind a formatted string into a WFN.
pub(crate) fn unbind(s: &str) -> Result<Wfn, CpeError> {
    let rest = s
        .strip_prefix(PREFIX)
        .ok_or_else(|| CpeError::UnknownPrefix(s.to_string()))?;
    let fields = split_fields(rest);
    if fields.len() != 11 {
        return Err(CpeError::WrongArity(fields.len()));
    }
    let mut wfn = Wfn::default();
    for (a, field) in Attribute::ALL.into_iter().zip(&fields) {
        *wfn.attr_mut(a) = unbind_value(field, a.name())?;
    }
    wfn.validate()?;
    Ok(wfn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbind_wrong_arity() {
        assert!(matches!(
            unbind("cpe:2.3:o:redhat"),
            Err(CpeError::WrongArity(2))
        ));
    }

    #[test]
    fn test_unbind_maps_any_and_na() {
        let wfn = unbind("cpe:2.3:a:redhat:openshift:4:-:*:*:*:*:*:*").unwrap();
        assert_eq!(wfn.update, Value::Na);
        assert_eq!(wfn.edition, Value::Any);
        assert_eq!(wfn.version, Value::Set("4".into()));
    }

    #[test]
    fn test_escaped_colon_survives() {
        let s = "cpe:2.3:a:vendor:prod\\:uct:1.0:*:*:*:*:*:*:*";
        let wfn = unbind(s).unwrap();
        assert_eq!(wfn.product, Value::Set("prod\\:uct".into()));
        assert_eq!(bind(&wfn), s);
    }

    #[test]
    fn test_dot_binds_bare() {
        let wfn = unbind("cpe:2.3:o:almalinux:almalinux:8.4:*:*:*:*:*:*:*").unwrap();
        assert_eq!(wfn.version, Value::Set("8\\.4".into()));
        assert_eq!(
            bind(&wfn),
            "cpe:2.3:o:almalinux:almalinux:8.4:*:*:*:*:*:*:*"
        );
    }

    #[test]
    fn test_wildcards_pass_through() {
        let wfn = unbind("cpe:2.3:a:redhat:openshift*:4.?:*:*:*:*:*:*:*").unwrap();
        assert!(wfn.product.has_wildcard());
        assert!(wfn.version.has_wildcard());
    }
}
