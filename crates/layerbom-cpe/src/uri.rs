//! CPE 2.2 URI binding
//!
//! `cpe:/` followed by up to seven colon-separated components. An empty
//! component binds ANY and `-` binds NA. The edition component may pack
//! the 2.3 extended attributes as `~edition~sw_edition~target_sw~
//! target_hw~other`. Percent escapes carry quoted characters; `%01` and
//! `%02` decode to the unquoted `?` and `*` wildcards.

use crate::value::Value;
use crate::wfn::Wfn;
use crate::CpeError;

const PREFIX: &str = "cpe:/";

// Bare in a URI component; everything else is percent-encoded. Tilde is
// excluded because it separates packed edition subfields.
fn bare_in_uri(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn bind_component(v: &Value) -> String {
    let quoted = match v {
        Value::Unset | Value::Any => return String::new(),
        Value::Na => return "-".to_string(),
        Value::Set(q) => q,
    };
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if bare_in_uri(escaped) {
                        out.push(escaped);
                    } else {
                        out.push_str(&format!("%{:02x}", escaped as u32));
                    }
                }
            }
            '?' => out.push_str("%01"),
            '*' => out.push_str("%02"),
            c => out.push(c),
        }
    }
    out
}

fn unbind_component(component: &str, attribute: &'static str) -> Result<Value, CpeError> {
    use crate::ValueError;
    match component {
        "" => return Ok(Value::Any),
        "-" => return Ok(Value::Na),
        _ => {}
    }
    let mut quoted = String::with_capacity(component.len());
    let chars: Vec<char> = component.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '%' => {
                let escape: String = chars[i..chars.len().min(i + 3)].iter().collect();
                if escape.len() < 3 {
                    return Err(CpeError::BadPercentEscape {
                        escape,
                        component: component.to_string(),
                    });
                }
                let code = u32::from_str_radix(&escape[1..], 16).map_err(|_| {
                    CpeError::BadPercentEscape {
                        escape: escape.clone(),
                        component: component.to_string(),
                    }
                })?;
                match code {
                    0x01 => quoted.push('?'),
                    0x02 => quoted.push('*'),
                    _ => {
                        let decoded = char::from_u32(code).filter(|c| c.is_ascii()).ok_or(
                            CpeError::BadPercentEscape {
                                escape,
                                component: component.to_string(),
                            },
                        )?;
                        quoted.push('\\');
                        quoted.push(decoded);
                    }
                }
                i += 3;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                quoted.push(c);
                i += 1;
            }
            '.' | '-' => {
                quoted.push('\\');
                quoted.push(c);
                i += 1;
            }
            c => {
                return Err(CpeError::BadValue {
                    attribute,
                    source: ValueError::UnquotedSpecial(c),
                })
            }
        }
    }
    Value::set(quoted).map_err(|source| CpeError::BadValue { attribute, source })
}

fn packed(v: &Value) -> bool {
    !matches!(v, Value::Unset | Value::Any)
}

/// Bind a WFN to its URI form.
pub(crate) fn bind(wfn: &Wfn) -> String {
    let edition = if packed(&wfn.sw_edition)
        || packed(&wfn.target_sw)
        || packed(&wfn.target_hw)
        || packed(&wfn.other)
    {
        format!(
            "~{}~{}~{}~{}~{}",
            bind_component(&wfn.edition),
            bind_component(&wfn.sw_edition),
            bind_component(&wfn.target_sw),
            bind_component(&wfn.target_hw),
            bind_component(&wfn.other),
        )
    } else {
        bind_component(&wfn.edition)
    };

    let mut components = vec![
        bind_component(&wfn.part),
        bind_component(&wfn.vendor),
        bind_component(&wfn.product),
        bind_component(&wfn.version),
        bind_component(&wfn.update),
        edition,
        bind_component(&wfn.language),
    ];
    while components.last().is_some_and(|c| c.is_empty()) {
        components.pop();
    }
    format!("{PREFIX}{}", components.join(":"))
}

/// Unbind a URI into a WFN.
pub(crate) fn unbind(s: &str) -> Result<Wfn, CpeError> {
    let rest = s
        .strip_prefix(PREFIX)
        .ok_or_else(|| CpeError::UnknownPrefix(s.to_string()))?;
    let components: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(':').collect()
    };
    if components.len() > 7 {
        return Err(CpeError::TooManyComponents(components.len()));
    }
    let get = |i: usize| components.get(i).copied().unwrap_or("");

    let mut wfn = Wfn::default();
    wfn.part = unbind_component(get(0), "part")?;
    wfn.vendor = unbind_component(get(1), "vendor")?;
    wfn.product = unbind_component(get(2), "product")?;
    wfn.version = unbind_component(get(3), "version")?;
    wfn.update = unbind_component(get(4), "update")?;
    wfn.language = unbind_component(get(6), "language")?;

    let edition = get(5);
    if let Some(packed) = edition.strip_prefix('~') {
        let subfields: Vec<&str> = packed.split('~').collect();
        if subfields.len() != 5 {
            return Err(CpeError::BadPackedEdition(subfields.len() + 1));
        }
        wfn.edition = unbind_component(subfields[0], "edition")?;
        wfn.sw_edition = unbind_component(subfields[1], "sw_edition")?;
        wfn.target_sw = unbind_component(subfields[2], "target_sw")?;
        wfn.target_hw = unbind_component(subfields[3], "target_hw")?;
        wfn.other = unbind_component(subfields[4], "other")?;
    } else {
        wfn.edition = unbind_component(edition, "edition")?;
        wfn.sw_edition = Value::Any;
        wfn.target_sw = Value::Any;
        wfn.target_hw = Value::Any;
        wfn.other = Value::Any;
    }
    wfn.validate()?;
    Ok(wfn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_edition_unpacks() {
        let wfn = unbind("cpe:/a:microsoft:internet_explorer:8.0.6001:beta:~~~~x64~").unwrap();
        assert_eq!(wfn.target_hw, Value::Set("x64".into()));
        assert_eq!(wfn.edition, Value::Any);
        assert_eq!(
            bind(&wfn),
            "cpe:/a:microsoft:internet_explorer:8.0.6001:beta:~~~~x64~"
        );
    }

    #[test]
    fn test_wildcard_escapes_decode() {
        let wfn = unbind("cpe:/a:redhat:openshift%02:4.%01").unwrap();
        assert!(wfn.product.has_wildcard());
        assert!(wfn.version.has_wildcard());
        assert_eq!(bind(&wfn), "cpe:/a:redhat:openshift%02:4.%01");
    }

    #[test]
    fn test_percent_escape_roundtrip() {
        let wfn = unbind("cpe:/a:vendor:name%21:1.0").unwrap();
        assert_eq!(wfn.product, Value::Set("name\\!".into()));
        assert_eq!(bind(&wfn), "cpe:/a:vendor:name%21:1.0");
    }

    #[test]
    fn test_bad_escapes_rejected() {
        assert!(matches!(
            unbind("cpe:/a:vendor:name%2"),
            Err(CpeError::BadPercentEscape { .. })
        ));
        assert!(matches!(
            unbind("cpe:/a:b:c:d:e:f:g:h"),
            Err(CpeError::TooManyComponents(8))
        ));
    }

    #[test]
    fn test_empty_uri_is_all_any() {
        let wfn = unbind("cpe:/").unwrap();
        assert_eq!(wfn.part, Value::Any);
        assert_eq!(wfn.vendor, Value::Any);
    }
}
