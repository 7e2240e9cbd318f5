//! Attribute-wise WFN comparison
//!
//! The relation between two names is the fold of the per-attribute
//! relations; any disjoint attribute makes the names disjoint. An unset
//! attribute compares like ANY.

use crate::value::{tokenize, Tok, Value};
use crate::wfn::{Attribute, Wfn};

/// Relation of a source value/name to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Superset,
    Subset,
    Disjoint,
}

fn is_any(v: &Value) -> bool {
    matches!(v, Value::Unset | Value::Any)
}

/// Match a wildcard pattern against a literal token sequence. `?` is
/// exactly one character, `*` zero or more.
fn wildcard_match(pattern: &[Tok], text: &[Tok]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(Tok::Star) => (0..=text.len()).any(|k| wildcard_match(&pattern[1..], &text[k..])),
        Some(Tok::Quest) => !text.is_empty() && wildcard_match(&pattern[1..], &text[1..]),
        Some(Tok::Char(c)) => match text.first() {
            Some(Tok::Char(t)) if t == c => wildcard_match(&pattern[1..], &text[1..]),
            _ => false,
        },
    }
}

fn set_relation(a: &str, b: &str) -> Relation {
    if a == b {
        return Relation::Equal;
    }
    // Values that fail to tokenize never got past validation; treat them
    // as plain disjoint literals.
    let (Ok(ta), Ok(tb)) = (tokenize(a), tokenize(b)) else {
        return Relation::Disjoint;
    };
    let wild_a = ta.iter().any(|t| !matches!(t, Tok::Char(_)));
    let wild_b = tb.iter().any(|t| !matches!(t, Tok::Char(_)));
    match (wild_a, wild_b) {
        // Wildcard-to-wildcard comparison is undefined past equality.
        (true, true) => Relation::Disjoint,
        (true, false) if wildcard_match(&ta, &tb) => Relation::Superset,
        (false, true) if wildcard_match(&tb, &ta) => Relation::Subset,
        _ => Relation::Disjoint,
    }
}

/// Relation of one attribute value to another.
pub(crate) fn compare_value(a: &Value, b: &Value) -> Relation {
    match (a, b) {
        _ if is_any(a) && is_any(b) => Relation::Equal,
        _ if is_any(a) => Relation::Superset,
        _ if is_any(b) => Relation::Subset,
        (Value::Na, Value::Na) => Relation::Equal,
        (Value::Na, _) | (_, Value::Na) => Relation::Disjoint,
        (Value::Set(x), Value::Set(y)) => set_relation(x, y),
        // All other combinations are covered above.
        _ => Relation::Disjoint,
    }
}

/// Fold the per-attribute relations. Disjoint short-circuits; otherwise
/// the result is Equal only if every attribute is Equal, Superset only if
/// every attribute is Superset or Equal, likewise for Subset; mixed
/// superset/subset attributes are disjoint names.
pub fn compare(a: &Wfn, b: &Wfn) -> Relation {
    let mut saw_superset = false;
    let mut saw_subset = false;
    for attr in Attribute::ALL {
        match compare_value(a.attr(attr), b.attr(attr)) {
            Relation::Disjoint => return Relation::Disjoint,
            Relation::Superset => saw_superset = true,
            Relation::Subset => saw_subset = true,
            Relation::Equal => {}
        }
    }
    match (saw_superset, saw_subset) {
        (false, false) => Relation::Equal,
        (true, false) => Relation::Superset,
        (false, true) => Relation::Subset,
        (true, true) => Relation::Disjoint,
    }
}

/// Whether `a` names a superset of `b` (equality included).
pub fn is_superset(a: &Wfn, b: &Wfn) -> bool {
    matches!(compare(a, b), Relation::Equal | Relation::Superset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_any_is_superset_of_everything() {
        assert_eq!(compare_value(&Value::Any, &Value::Na), Relation::Superset);
        assert_eq!(
            compare_value(&Value::Any, &Value::Set("x".into())),
            Relation::Superset
        );
        assert_eq!(compare_value(&Value::Unset, &Value::Any), Relation::Equal);
    }

    #[test]
    fn test_na_only_matches_na() {
        assert_eq!(compare_value(&Value::Na, &Value::Na), Relation::Equal);
        assert_eq!(
            compare_value(&Value::Na, &Value::Set("x".into())),
            Relation::Disjoint
        );
    }

    #[test]
    fn test_wildcard_superset() {
        assert_eq!(
            compare_value(&Value::Set("openshift*".into()), &Value::Set("openshift4".into())),
            Relation::Superset
        );
        assert_eq!(
            compare_value(&Value::Set("4\\.?".into()), &Value::Set("4\\.1".into())),
            Relation::Superset
        );
        // ? is exactly one character
        assert_eq!(
            compare_value(&Value::Set("4\\.?".into()), &Value::Set("4\\.13".into())),
            Relation::Disjoint
        );
    }

    #[test]
    fn test_name_superset_folds_attributes() {
        let wide = parse("cpe:2.3:o:redhat:enterprise_linux:8:*:*:*:*:*:*:*").unwrap();
        let narrow = parse("cpe:/o:redhat:enterprise_linux:8::baseos").unwrap();
        assert!(is_superset(&wide, &narrow));
        assert!(!is_superset(&narrow, &wide));
    }

    #[test]
    fn test_disjoint_version_short_circuits() {
        let a = parse("cpe:/a:redhat:openshift:4").unwrap();
        let b = parse("cpe:/a:redhat:openshift:4.13::el8").unwrap();
        // "4" and "4.13" are different literals; no strict relation holds.
        assert_eq!(compare(&a, &b), Relation::Disjoint);
    }

    #[test]
    fn test_superset_antisymmetry() {
        let a = parse("cpe:/o:almalinux:almalinux:8.4:GA").unwrap();
        let b = parse("cpe:/o:almalinux:almalinux:8.4:GA").unwrap();
        assert!(is_superset(&a, &b) && is_superset(&b, &a));
        assert_eq!(compare(&a, &b), Relation::Equal);

        let wider = parse("cpe:/o:almalinux:almalinux:8.4").unwrap();
        assert!(is_superset(&wider, &a) ^ is_superset(&a, &wider));
    }
}
