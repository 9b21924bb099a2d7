//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for classified filesystem entries
//! and provides functions to provision and configure the database.

use crate::config::WriteMode;
use crate::error::{DbError, DbResult};
use rusqlite::Connection;
use std::time::Duration;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the main entries table
const CREATE_FILE_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file_info (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,           -- parent joined with name
    parent TEXT NOT NULL,
    name TEXT NOT NULL,           -- empty for the scan root
    size INTEGER,
    mode INTEGER,                 -- Permission and type bits
    time TEXT,                    -- Modification time, RFC 3339
    extension TEXT,               -- Lowercase, without dot
    is_dir BOOLEAN,
    short_classification TEXT,
    classification TEXT
)
"#;

const DROP_FILE_INFO_TABLE: &str = "DROP TABLE IF EXISTS file_info";

/// SQL to create scan metadata table
const CREATE_SCAN_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scan_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Upsert key; must exist before the first insert
const CREATE_PATH_UNIQUE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_info_path ON file_info(path)";

/// Paths stored more than once, which would break the unique index
const COUNT_DUPLICATE_PATHS: &str =
    "SELECT COUNT(*) FROM (SELECT path FROM file_info GROUP BY path HAVING COUNT(*) > 1)";

/// SQL to create indexes for common queries
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_file_info_parent ON file_info(parent)",
    "CREATE INDEX IF NOT EXISTS idx_file_info_extension ON file_info(extension)",
    "CREATE INDEX IF NOT EXISTS idx_file_info_short ON file_info(short_classification)",
    "CREATE INDEX IF NOT EXISTS idx_file_info_is_dir ON file_info(is_dir)",
];

const INSERT_ENTRY: &str = "INSERT INTO file_info (path, parent, name, size, mode, time, \
     extension, is_dir, short_classification, classification) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

const UPSERT_ENTRY: &str = "INSERT OR REPLACE INTO file_info (path, parent, name, size, mode, \
     time, extension, is_dir, short_classification, classification) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

/// Per-connection pragmas. WAL lets every worker connection take its turn
/// at the write lock while the others keep their snapshots.
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;      -- 32MB cache per connection
PRAGMA temp_store = MEMORY;
"#;

/// Statement used by workers for the given write mode
pub fn insert_sql(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Upsert => UPSERT_ENTRY,
        WriteMode::Replace | WriteMode::Append => INSERT_ENTRY,
    }
}

/// Apply connection settings shared by the control and worker connections
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(())
}

/// Create the tables for a run in the given write mode
///
/// `Replace` drops any previous `file_info`; `Upsert` adds the unique path
/// index the `INSERT OR REPLACE` statement keys on, and refuses a table
/// where an earlier `Append` run left repeated paths.
pub fn provision(conn: &Connection, mode: WriteMode) -> DbResult<()> {
    if mode == WriteMode::Replace {
        conn.execute(DROP_FILE_INFO_TABLE, [])?;
    }

    conn.execute(CREATE_FILE_INFO_TABLE, [])?;
    conn.execute(CREATE_SCAN_INFO_TABLE, [])?;

    if mode == WriteMode::Upsert {
        let count: i64 = conn.query_row(COUNT_DUPLICATE_PATHS, [], |row| row.get(0))?;
        if count > 0 {
            return Err(DbError::DuplicatePaths {
                count: count as u64,
            });
        }
        conn.execute(CREATE_PATH_UNIQUE_INDEX, [])?;
    }

    Ok(())
}

/// Create indexes (called after the walk for better insert performance)
pub fn create_indexes(conn: &Connection) -> DbResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Update query planner statistics
pub fn optimize_for_reads(conn: &Connection) -> DbResult<()> {
    conn.execute("ANALYZE", [])?;
    Ok(())
}

/// Store scan metadata
pub fn set_scan_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO scan_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get scan metadata
pub fn get_scan_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM scan_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys used by the scanner
pub mod keys {
    /// Root directory that was scanned
    pub const ROOT: &str = "root";

    /// replace, upsert or append
    pub const WRITE_MODE: &str = "write_mode";

    /// Timestamp when the scan started (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the scan ended (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Total duration in seconds
    pub const DURATION_SECS: &str = "duration_secs";

    /// Number of worker threads used
    pub const WORKER_COUNT: &str = "worker_count";

    /// Rows per transaction
    pub const COMMIT_INTERVAL: &str = "commit_interval";

    /// Entries produced by the walker
    pub const TOTAL_ENTRIES: &str = "total_entries";

    /// Rows committed by all workers
    pub const ROWS_COMMITTED: &str = "rows_committed";

    /// Total directories scanned
    pub const TOTAL_DIRS: &str = "total_dirs";

    /// Total files found
    pub const TOTAL_FILES: &str = "total_files";

    /// Total bytes (sum of file sizes)
    pub const TOTAL_BYTES: &str = "total_bytes";

    /// Directories or entries skipped by the walker
    pub const WALK_ERRORS: &str = "walk_errors";

    /// Entries stored without a classification
    pub const CLASSIFY_FAILURES: &str = "classify_failures";

    /// Rows that failed to insert
    pub const INSERT_FAILURES: &str = "insert_failures";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Scanner version
    pub const SCANNER_VERSION: &str = "scanner_version";

    /// Scan status: "running", "completed", "interrupted", "failed"
    pub const STATUS: &str = "status";
}
