//! DNF transaction-history lookups
//!
//! Red-Hat-family images installed through dnf leave a transaction history
//! database on the layer. Looking an installed package up by
//! `(name, epoch, version, release, arch)` recovers the repository id it
//! was installed from, which the coalescer folds into the package's
//! repository hint.

use anyhow::{Context, Result};
use layerbom_core::{Layer, Package};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

// dnf5 writes action 8 for removals, dnf 3/4 action 5.
const DNF5_PATH: &str = "usr/lib/sysimage/libdnf5/transaction_history.sqlite";
const DNF5_REMOVED_ACTION: i64 = 8;
const DNF_PATH: &str = "var/lib/dnf/history.sqlite";
const DNF_REMOVED_ACTION: i64 = 5;

const REPOID_QUERY: &str = "\
SELECT repo.repoid
  FROM rpm
  JOIN trans_item ON trans_item.item_id = rpm.item_id
  JOIN repo ON repo.id = trans_item.repo_id
 WHERE rpm.name = ?1 AND rpm.epoch = ?2 AND rpm.version = ?3
   AND rpm.release = ?4 AND rpm.arch = ?5
   AND trans_item.action != ?6
 ORDER BY trans_item.id DESC
 LIMIT 1";

/// A long-lived handle on one layer's history database.
///
/// The connection is serialized behind a mutex, which is the per-call
/// concurrency bound. The handle must be explicitly closed; dropping an
/// open handle is a programming error and panics.
pub struct HistoryDb {
    conn: Mutex<Connection>,
    removed_action: i64,
    memo: Mutex<HashMap<String, Option<String>>>,
    closed: bool,
}

impl HistoryDb {
    /// Open the newest history database present on the layer, if any.
    pub fn open_on_layer(layer: &Layer) -> Result<Option<HistoryDb>> {
        for (path, removed_action) in [
            (DNF5_PATH, DNF5_REMOVED_ACTION),
            (DNF_PATH, DNF_REMOVED_ACTION),
        ] {
            if !layer.contains(path) {
                continue;
            }
            let full = layer.path(path);
            let conn = Connection::open_with_flags(&full, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .with_context(|| format!("opening dnf history {}", full.display()))?;
            debug!("using dnf history {} on layer {}", path, layer.digest());
            return Ok(Some(HistoryDb {
                conn: Mutex::new(conn),
                removed_action,
                memo: Mutex::new(HashMap::new()),
                closed: false,
            }));
        }
        Ok(None)
    }

    /// The repository a package was last installed from, ignoring removal
    /// transactions. Lookups are memoized for the life of the handle.
    pub fn repoid_for(&self, package: &Package) -> Result<Option<String>> {
        let (epoch, version, release) = split_evr(&package.version);
        let key = format!(
            "{}-{}:{}-{}.{}",
            package.name, epoch, version, release, package.arch
        );
        if let Some(hit) = self.memo.lock().expect("dnf memo poisoned").get(&key) {
            return Ok(hit.clone());
        }

        let conn = self.conn.lock().expect("dnf connection poisoned");
        let repoid: Option<String> = conn
            .prepare_cached(REPOID_QUERY)
            .context("preparing dnf history query")?
            .query_row(
                rusqlite::params![
                    package.name,
                    epoch,
                    version,
                    release,
                    package.arch,
                    self.removed_action
                ],
                |row| row.get(0),
            )
            .optional()
            .context("querying dnf history")?;
        drop(conn);

        self.memo
            .lock()
            .expect("dnf memo poisoned")
            .insert(key, repoid.clone());
        Ok(repoid)
    }

    /// Release the connection. Required before drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Drop for HistoryDb {
    fn drop(&mut self) {
        if !self.closed && !std::thread::panicking() {
            panic!("HistoryDb dropped without close()");
        }
    }
}

/// Split `[epoch:]version-release`; missing epoch is 0, missing release is
/// empty.
fn split_evr(v: &str) -> (i64, &str, &str) {
    let (epoch, rest) = match v.split_once(':') {
        Some((e, rest)) => (e.parse().unwrap_or(0), rest),
        None => (0, v),
    };
    match rest.rsplit_once('-') {
        Some((version, release)) => (epoch, version, release),
        None => (epoch, rest, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerbom_core::Digest;

    fn fixture_layer() -> (tempfile::TempDir, Layer) {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join(DNF5_PATH);
        std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE rpm (item_id INTEGER PRIMARY KEY, name TEXT, epoch INTEGER,
                               version TEXT, release TEXT, arch TEXT);
             CREATE TABLE repo (id INTEGER PRIMARY KEY, repoid TEXT);
             CREATE TABLE trans_item (id INTEGER PRIMARY KEY, item_id INTEGER,
                                      repo_id INTEGER, action INTEGER);
             INSERT INTO rpm VALUES (1, 'bash', 0, '4.4.19', '12.el8', 'x86_64');
             INSERT INTO repo VALUES (1, 'baseos');
             INSERT INTO repo VALUES (2, 'appstream');
             INSERT INTO trans_item VALUES (1, 1, 1, 1);
             INSERT INTO trans_item VALUES (2, 1, 2, 8);",
        )
        .unwrap();
        drop(conn);

        let layer = Layer::new(Digest::sha256_of(b"l"), dir.path().to_path_buf());
        (dir, layer)
    }

    fn bash() -> Package {
        Package {
            name: "bash".into(),
            version: "4.4.19-12.el8".into(),
            arch: "x86_64".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_evr() {
        assert_eq!(split_evr("4.4.19-12.el8"), (0, "4.4.19", "12.el8"));
        assert_eq!(split_evr("1:9.0.1-3.el9"), (1, "9.0.1", "3.el9"));
        assert_eq!(split_evr("2.0"), (0, "2.0", ""));
    }

    #[test]
    fn test_repoid_lookup_skips_removals() {
        let (_dir, layer) = fixture_layer();
        let db = HistoryDb::open_on_layer(&layer).unwrap().unwrap();
        // The newest transaction for bash is the removal (action 8); the
        // lookup must fall back to the install from baseos.
        assert_eq!(db.repoid_for(&bash()).unwrap().as_deref(), Some("baseos"));
        assert_eq!(db.repoid_for(&bash()).unwrap().as_deref(), Some("baseos"));
        db.close().unwrap();
    }

    #[test]
    fn test_unknown_package_is_none() {
        let (_dir, layer) = fixture_layer();
        let db = HistoryDb::open_on_layer(&layer).unwrap().unwrap();
        let mut p = bash();
        p.name = "zsh".into();
        assert_eq!(db.repoid_for(&p).unwrap(), None);
        db.close().unwrap();
    }

    #[test]
    fn test_absent_history_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let layer = Layer::new(Digest::sha256_of(b"l"), dir.path().to_path_buf());
        assert!(HistoryDb::open_on_layer(&layer).unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = "without close")]
    fn test_drop_without_close_panics() {
        let (_dir, layer) = fixture_layer();
        let db = HistoryDb::open_on_layer(&layer).unwrap().unwrap();
        drop(db);
    }
}
