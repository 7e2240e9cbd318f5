//! apk version grammar
//!
//! Alpine package versions look like `1.2.3_rc1-r4`: dotted numeric parts,
//! an optional single-letter suffix, optional `_`-joined pre/post-release
//! words, and a `-rN` package release. Pre-release words sort before the
//! bare version, post-release words after, in apk-tools' fixed order.

use std::cmp::Ordering;

/// apk's suffix vocabulary, in sort order. Everything before `(none)`
/// is a pre-release, everything after a post-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    None,
    Cvs,
    Svn,
    Git,
    Hg,
    P,
}

impl Suffix {
    fn parse(word: &str) -> Option<(Suffix, u64)> {
        let split = word.find(|c: char| c.is_ascii_digit()).unwrap_or(word.len());
        let (name, digits) = word.split_at(split);
        let n = digits.parse().unwrap_or(0);
        let suffix = match name {
            "alpha" => Suffix::Alpha,
            "beta" => Suffix::Beta,
            "pre" => Suffix::Pre,
            "rc" => Suffix::Rc,
            "cvs" => Suffix::Cvs,
            "svn" => Suffix::Svn,
            "git" => Suffix::Git,
            "hg" => Suffix::Hg,
            "p" => Suffix::P,
            _ => return None,
        };
        Some((suffix, n))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ApkVersion {
    parts: Vec<u64>,
    letter: Option<char>,
    suffixes: Vec<(Suffix, u64)>,
    release: u64,
}

fn parse(v: &str) -> ApkVersion {
    let (version, release) = match v.rsplit_once("-r") {
        Some((head, rel)) if rel.chars().all(|c| c.is_ascii_digit()) => {
            (head, rel.parse().unwrap_or(0))
        }
        _ => (v, 0),
    };

    let mut words = version.split('_');
    let numeric = words.next().unwrap_or("");

    let mut parts = Vec::new();
    let mut letter = None;
    for (i, part) in numeric.split('.').enumerate() {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse() {
            parts.push(n);
        } else if i == 0 {
            parts.push(0);
        }
        // A trailing letter is only significant on the last numeric part.
        letter = part.chars().skip(digits.len()).next().filter(|c| c.is_ascii_alphabetic());
    }

    let suffixes = words.filter_map(Suffix::parse).collect();
    ApkVersion {
        parts,
        letter,
        suffixes,
        release,
    }
}

/// Compare two apk versions.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = parse(a);
    let b = parse(b);

    let len = a.parts.len().max(b.parts.len());
    for i in 0..len {
        let x = a.parts.get(i).copied().unwrap_or(0);
        let y = b.parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    match (a.letter, b.letter) {
        (Some(x), Some(y)) if x != y => return x.cmp(&y),
        (Some(_), None) => return Ordering::Greater,
        (None, Some(_)) => return Ordering::Less,
        _ => {}
    }

    let suffixes = a.suffixes.len().max(b.suffixes.len());
    for i in 0..suffixes {
        let x = a.suffixes.get(i).copied().unwrap_or((Suffix::None, 0));
        let y = b.suffixes.get(i).copied().unwrap_or((Suffix::None, 0));
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    a.release.cmp(&b.release)
}

/// Whether an installed version predates the fix.
pub fn is_version_affected(installed: &str, fixed: &str) -> bool {
    compare(installed, fixed) == Ordering::Less
}
