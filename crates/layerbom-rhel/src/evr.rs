//! RPM version grammar
//!
//! `[epoch:]version-release` with rpm's segment comparison: split on
//! non-alphanumerics, numeric segments compare numerically with leading
//! zeros stripped, alphabetic segments compare lexically, a numeric
//! segment beats an alphabetic one, tilde sorts before everything
//! including the empty string, caret sorts after the empty string but
//! before any other content.

use std::cmp::Ordering;
use std::fmt;

/// A parsed epoch-version-release triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evr {
    pub epoch: i64,
    pub version: String,
    pub release: String,
}

impl Evr {
    /// Parse `[epoch:]version-release`. A missing epoch is 0, a missing
    /// release is empty. Never fails; rpm treats any string as a version.
    pub fn parse(s: &str) -> Evr {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => (e.parse().unwrap_or(0), rest),
            None => (0, s),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v, r),
            None => (rest, ""),
        };
        Evr {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        }
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_seg_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'~' || b == b'^'
}

/// rpm's segment-wise version comparison.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    while !one.is_empty() || !two.is_empty() {
        // Separator characters only delimit segments.
        while let Some(&c) = one.first() {
            if is_seg_byte(c) {
                break;
            }
            one = &one[1..];
        }
        while let Some(&c) = two.first() {
            if is_seg_byte(c) {
                break;
            }
            two = &two[1..];
        }

        // Tilde sorts before everything, including the empty string.
        let t1 = one.first() == Some(&b'~');
        let t2 = two.first() == Some(&b'~');
        if t1 || t2 {
            if !t1 {
                return Ordering::Greater;
            }
            if !t2 {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        // Caret sorts after the empty string but before anything else.
        let c1 = one.first() == Some(&b'^');
        let c2 = two.first() == Some(&b'^');
        if c1 || c2 {
            if one.is_empty() {
                return Ordering::Less;
            }
            if two.is_empty() {
                return Ordering::Greater;
            }
            if !c1 {
                return Ordering::Greater;
            }
            if !c2 {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        fn take(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
            let end = s
                .iter()
                .position(|&c| {
                    if numeric {
                        !c.is_ascii_digit()
                    } else {
                        !c.is_ascii_alphabetic()
                    }
                })
                .unwrap_or(s.len());
            s.split_at(end)
        }
        let (seg1, rest1) = take(one, numeric);
        let (seg2, rest2) = take(two, numeric);

        if numeric {
            // A numeric segment always beats an alphabetic one.
            if seg2.is_empty() {
                return Ordering::Greater;
            }
            let s1 = strip_zeros(seg1);
            let s2 = strip_zeros(seg2);
            match s1.len().cmp(&s2.len()).then_with(|| s1.cmp(s2)) {
                Ordering::Equal => {}
                other => return other,
            }
        } else {
            if seg2.is_empty() {
                return Ordering::Less;
            }
            match seg1.cmp(seg2) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        one = rest1;
        two = rest2;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

fn strip_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lt(a: &str, b: &str) {
        assert_eq!(rpmvercmp(a, b), Ordering::Less, "{a} < {b}");
        assert_eq!(rpmvercmp(b, a), Ordering::Greater, "{b} > {a}");
    }

    fn eq(a: &str, b: &str) {
        assert_eq!(rpmvercmp(a, b), Ordering::Equal, "{a} == {b}");
    }

    #[test]
    fn test_numeric_segments() {
        eq("1.0", "1.0");
        lt("1.0", "1.1");
        lt("2.0", "10.0");
        eq("1.05", "1.5");
        lt("5.0.1", "5.0.10");
    }

    #[test]
    fn test_alpha_and_mixed_segments() {
        lt("alpha", "beta");
        lt("1.0a", "1.0b");
        // Numeric beats alpha.
        lt("1.0a", "1.01");
        lt("a", "1");
        lt("1.fc31", "1.1");
    }

    #[test]
    fn test_tilde_sorts_first() {
        lt("1.0~rc1", "1.0");
        lt("1.0~rc1", "1.0~rc2");
        eq("1.0~rc1", "1.0~rc1");
        lt("1.0~~", "1.0~");
    }

    #[test]
    fn test_caret_sorts_after_empty() {
        lt("1.0", "1.0^");
        lt("1.0^", "1.0.1");
        lt("1.0^git1", "1.0.1");
        eq("1.0^git1", "1.0^git1");
    }

    #[test]
    fn test_separators_are_equivalent() {
        eq("1.0.1", "1_0_1");
        eq("2.50", "2.50");
        lt("1..0", "1.0.1");
    }

    #[test]
    fn test_evr_parse_and_order() {
        let evr = Evr::parse("1:9.0.1-3.el9");
        assert_eq!(evr.epoch, 1);
        assert_eq!(evr.version, "9.0.1");
        assert_eq!(evr.release, "3.el9");

        let no_epoch = Evr::parse("0.33.0-6.el8");
        assert_eq!(no_epoch.epoch, 0);

        // Epoch dominates.
        assert!(Evr::parse("1:1.0-1") > Evr::parse("2.0-1"));
        // Release breaks version ties.
        assert!(Evr::parse("0.33.0-4.el8") < Evr::parse("0.33.0-5.el8"));
        assert!(Evr::parse("0.33.0-6.el8") > Evr::parse("0.33.0-5.el8"));
    }

    #[test]
    fn test_evr_display_roundtrip() {
        for s in ["1:9.0.1-3.el9", "0.33.0-6.el8", "2.0"] {
            assert_eq!(Evr::parse(s).to_string(), s);
        }
    }
}
