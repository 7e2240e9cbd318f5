//! RPM database discovery
//!
//! Parsing the database formats is the package detector's job; this module
//! only knows where the databases live and which flavor a path is.

use layerbom_core::Layer;

/// RPM database flavors, by file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpmDbKind {
    BerkeleyDb,
    Ndb,
    Sqlite,
}

const PREFIXES: [&str; 2] = ["var/lib/rpm", "usr/lib/sysimage/rpm"];
const FILES: [(&str, RpmDbKind); 3] = [
    ("Packages", RpmDbKind::BerkeleyDb),
    ("Packages.db", RpmDbKind::Ndb),
    ("rpmdb.sqlite", RpmDbKind::Sqlite),
];

/// Locate every RPM database present on a layer, as layer-relative paths.
pub fn find_databases(layer: &Layer) -> Vec<(String, RpmDbKind)> {
    let mut found = Vec::new();
    for prefix in PREFIXES {
        for (file, kind) in FILES {
            let rel = format!("{prefix}/{file}");
            if layer.contains(&rel) {
                found.push((rel, kind));
            }
        }
    }
    found
}
