//! Transactional entry store
//!
//! [`EntryStore`] is the seam between a worker's batch committer and the
//! database. Each worker owns one store, so implementations never need to
//! be shared between threads.

use crate::config::WriteMode;
use crate::db::schema;
use crate::entry::FilesystemEntry;
use crate::error::{DbError, DbResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Sink for entry rows with explicit transaction control
pub trait EntryStore {
    /// Open a transaction and prepare the insert statement
    fn begin(&mut self) -> DbResult<()>;

    /// Insert one entry into the open transaction
    fn insert(&mut self, entry: &FilesystemEntry) -> DbResult<()>;

    /// Commit the open transaction and release the prepared statement
    fn commit(&mut self) -> DbResult<()>;

    /// Discard the open transaction, if any
    fn rollback(&mut self) -> DbResult<()>;
}

/// SQLite-backed store holding one connection
pub struct SqliteStore {
    conn: Connection,
    insert_sql: &'static str,
}

impl SqliteStore {
    /// Open a worker connection to an already provisioned database
    ///
    /// `busy_timeout` bounds a single lock attempt; the committer decides
    /// how many attempts a batch gets.
    pub fn open(path: &Path, mode: WriteMode, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::configure_connection(&conn, busy_timeout)?;

        Ok(Self {
            conn,
            insert_sql: schema::insert_sql(mode),
        })
    }
}

impl EntryStore for SqliteStore {
    fn begin(&mut self) -> DbResult<()> {
        // IMMEDIATE takes the write lock up front so a busy database fails
        // here, before any insert, where the committer can retry it
        self.conn.execute_batch("BEGIN IMMEDIATE")?;

        if let Err(e) = self.conn.prepare_cached(self.insert_sql) {
            if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback_err, "Rollback after failed prepare failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn insert(&mut self, entry: &FilesystemEntry) -> DbResult<()> {
        let path = entry.path();
        let modified = entry.modified_rfc3339();
        let size = i64::try_from(entry.size).unwrap_or_else(|_| {
            warn!(
                path = %path.display(),
                size = entry.size,
                "Size exceeds INTEGER range, clamped"
            );
            i64::MAX
        });

        let mut stmt = self.conn.prepare_cached(self.insert_sql)?;
        let result = stmt.execute(params![
            path.to_string_lossy(),
            entry.parent.to_string_lossy(),
            entry.name_lossy(),
            size,
            entry.mode as i64,
            modified,
            entry.extension,
            entry.is_dir(),
            entry.short_classification,
            entry.classification,
        ]);
        drop(stmt);

        match result {
            Ok(_) => Ok(()),
            // Errors such as SQLITE_FULL roll back the whole transaction
            Err(e) if self.conn.is_autocommit() => {
                Err(DbError::TransactionAborted(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&mut self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.conn.flush_prepared_statement_cache();
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.conn.flush_prepared_statement_cache();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;
    use std::ffi::OsString;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn entry(name: &str) -> FilesystemEntry {
        FilesystemEntry {
            parent: PathBuf::from("/data"),
            name: OsString::from(name),
            entry_type: EntryType::File,
            size: 10,
            mode: 0o100644,
            modified: None,
            extension: crate::entry::extension_of(name),
            classification: "ASCII text".into(),
            short_classification: "ASCII text".into(),
        }
    }

    fn open_store(db_path: &Path, mode: WriteMode) -> SqliteStore {
        let conn = Connection::open(db_path).unwrap();
        schema::provision(&conn, mode).unwrap();
        drop(conn);
        SqliteStore::open(db_path, mode, Duration::from_secs(5)).unwrap()
    }

    fn count_rows(db_path: &Path) -> i64 {
        let conn = Connection::open(db_path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM file_info", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_makes_rows_visible() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut store = open_store(&db_path, WriteMode::Replace);

        store.begin().unwrap();
        assert!(!store.conn.is_autocommit());
        store.insert(&entry("notes.txt")).unwrap();
        store.insert(&entry("a.bin")).unwrap();
        assert_eq!(count_rows(&db_path), 0);

        store.commit().unwrap();
        assert!(store.conn.is_autocommit());
        assert_eq!(count_rows(&db_path), 2);

        let conn = Connection::open(&db_path).unwrap();
        let (path, ext, short): (String, String, String) = conn
            .query_row(
                "SELECT path, extension, short_classification FROM file_info \
                 WHERE name = 'notes.txt'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(path, "/data/notes.txt");
        assert_eq!(ext, "txt");
        assert_eq!(short, "ASCII text");
    }

    #[test]
    fn test_rollback_discards_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut store = open_store(&db_path, WriteMode::Append);

        store.begin().unwrap();
        store.insert(&entry("notes.txt")).unwrap();
        store.rollback().unwrap();
        assert_eq!(count_rows(&db_path), 0);

        // Rolling back with nothing open is a no-op
        store.rollback().unwrap();
    }

    #[test]
    fn test_upsert_keys_on_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut store = open_store(&db_path, WriteMode::Upsert);

        for _ in 0..2 {
            store.begin().unwrap();
            store.insert(&entry("notes.txt")).unwrap();
            store.commit().unwrap();
        }
        assert_eq!(count_rows(&db_path), 1);
    }

    #[test]
    fn test_workers_share_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut first = open_store(&db_path, WriteMode::Append);
        let mut second =
            SqliteStore::open(&db_path, WriteMode::Append, Duration::from_secs(5)).unwrap();

        first.begin().unwrap();
        first.insert(&entry("a")).unwrap();
        first.commit().unwrap();

        second.begin().unwrap();
        second.insert(&entry("b")).unwrap();
        second.commit().unwrap();

        assert_eq!(count_rows(&db_path), 2);
    }

    #[test]
    fn test_busy_begin_is_retryable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut holder = open_store(&db_path, WriteMode::Append);
        let mut waiter =
            SqliteStore::open(&db_path, WriteMode::Append, Duration::from_millis(10)).unwrap();

        holder.begin().unwrap();
        let err = waiter.begin().unwrap_err();
        assert!(err.is_retryable());

        holder.commit().unwrap();
        waiter.begin().unwrap();
        waiter.commit().unwrap();
    }

    #[test]
    fn test_failed_prepare_closes_transaction() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut store = open_store(&db_path, WriteMode::Append);
        store.conn.execute_batch("DROP TABLE file_info").unwrap();

        assert!(store.begin().is_err());
        assert!(store.conn.is_autocommit());
    }

    #[test]
    fn test_oversized_size_is_clamped() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut store = open_store(&db_path, WriteMode::Replace);

        let mut huge = entry("sparse.img");
        huge.size = u64::MAX;
        store.begin().unwrap();
        store.insert(&huge).unwrap();
        store.commit().unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let size: i64 = conn
            .query_row("SELECT size FROM file_info", [], |row| row.get(0))
            .unwrap();
        assert_eq!(size, i64::MAX);
    }
}
