//! Session-scoped record of blocks already delivered.
//!
//! Keys are `bp_sent_<fingerprint>`; only presence matters. Entries are added
//! after a confirmed delivery and are only ever removed all at once when the
//! session ends. An in-memory set mirrors the table so lookups on every scan
//! tick never touch SQLite.

use crate::fingerprint::Fingerprint;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent set of delivered fingerprints for one session
pub struct DedupStore {
    conn: Connection,
    sent: HashSet<Fingerprint>,
}

impl DedupStore {
    /// Open or create the session store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self::from_connection(conn)?;
        info!(
            "Opened session store {:?} ({} blocks already sent)",
            path.as_ref(),
            store.len()
        );
        Ok(store)
    }

    /// Open a store that lives only as long as this value (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sent_blocks (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                sent_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        let mut sent = HashSet::new();
        {
            let mut stmt = conn.prepare("SELECT key FROM sent_blocks")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                let key = row?;
                match Fingerprint::from_storage_key(&key) {
                    Some(fp) => {
                        sent.insert(fp);
                    }
                    None => debug!("Ignoring unrecognised session key {}", key),
                }
            }
        }

        Ok(Self { conn, sent })
    }

    /// Whether this fingerprint was already delivered in this session
    pub fn has(&self, fp: Fingerprint) -> bool {
        self.sent.contains(&fp)
    }

    /// Remember a delivered fingerprint.
    ///
    /// The in-memory set is updated first, so a failed write still dedups
    /// for the rest of this process; only persistence across restarts is lost.
    pub fn record(&mut self, fp: Fingerprint) -> Result<(), StoreError> {
        self.sent.insert(fp);
        self.conn.execute(
            "INSERT OR IGNORE INTO sent_blocks (key, value) VALUES (?1, ?2)",
            params![fp.storage_key(), "true"],
        )?;
        Ok(())
    }

    /// End the session: forget every delivered fingerprint
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM sent_blocks", [])?;
        let removed = self.sent.len();
        self.sent.clear();
        info!("Session cleared ({} entries removed)", removed);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Make every later write fail
    #[cfg(test)]
    pub(crate) fn reject_writes(&self) {
        self.conn
            .execute_batch("PRAGMA query_only = ON;")
            .unwrap();
    }
}

/// Path of the store file for a named session inside `dir`
pub fn session_path(dir: &Path, name: &str) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{}.db", safe))
}

/// Default directory holding session stores
pub fn default_session_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patch-bridge")
        .join("sessions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    #[test]
    fn test_new_store_is_empty() {
        let store = DedupStore::open_in_memory().unwrap();
        assert!(store.is_empty());
        assert!(!store.has(fingerprint("anything")));
    }

    #[test]
    fn test_record_and_has() {
        let mut store = DedupStore::open_in_memory().unwrap();
        let fp = fingerprint("block");

        store.record(fp).unwrap();
        assert!(store.has(fp));
        assert!(!store.has(fingerprint("other")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_twice_is_idempotent() {
        let mut store = DedupStore::open_in_memory().unwrap();
        let fp = fingerprint("block");

        store.record(fp).unwrap();
        store.record(fp).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_write_still_dedups_in_memory() {
        let mut store = DedupStore::open_in_memory().unwrap();
        store.reject_writes();
        let fp = fingerprint("block");

        assert!(store.record(fp).is_err());
        assert!(store.has(fp));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = session_path(dir.path(), "default");
        let fp = fingerprint("block");

        {
            let mut store = DedupStore::open(&path).unwrap();
            store.record(fp).unwrap();
        }

        let store = DedupStore::open(&path).unwrap();
        assert!(store.has(fp));
    }

    #[test]
    fn test_clear_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = session_path(dir.path(), "s1");

        {
            let mut store = DedupStore::open(&path).unwrap();
            store.record(fingerprint("a")).unwrap();
            store.record(fingerprint("b")).unwrap();
            store.clear().unwrap();
            assert!(store.is_empty());
        }

        let store = DedupStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_use_session_prefix() {
        let mut store = DedupStore::open_in_memory().unwrap();
        let fp = fingerprint("hello");
        store.record(fp).unwrap();

        let key: String = store
            .conn
            .query_row("SELECT key FROM sent_blocks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(key, "bp_sent_4625896200565286");
    }

    #[test]
    fn test_session_path_sanitizes_name() {
        let path = session_path(Path::new("/tmp/s"), "chat/../x y");
        assert_eq!(path, PathBuf::from("/tmp/s/chat____x_y.db"));
    }
}
