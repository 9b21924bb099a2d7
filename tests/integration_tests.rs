//! Integration tests for calyx
//!
//! These tests scan small trees under a temporary directory and inspect the
//! resulting SQLite database.

use calyx::classify::{Classifier, FileCommandClassifier, MagicClassifier};
use calyx::config::{CliArgs, ScanConfig, WriteMode};
use calyx::db::schema::{self, keys};
use calyx::error::{ClassifyError, ConfigError, ScanError, WalkError};
use calyx::walker::ScanCoordinator;
use clap::Parser;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

#[derive(Debug, PartialEq)]
struct Row {
    path: String,
    parent: String,
    name: String,
    size: i64,
    extension: String,
    is_dir: bool,
    short_classification: String,
    classification: String,
}

/// Root `data` holding `notes.txt` (10 bytes) and `sub/a.bin` (empty)
fn data_tree() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("data");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("notes.txt"), b"0123456789").unwrap();
    fs::write(root.join("sub/a.bin"), b"").unwrap();
    (dir, root)
}

fn scan_config(root: &Path, db_path: &Path, workers: usize, mode: WriteMode) -> ScanConfig {
    let mut config = ScanConfig::new(root, db_path);
    config.worker_count = workers;
    config.commit_interval = 2;
    config.write_mode = mode;
    config
}

fn scan(config: ScanConfig) -> calyx::Result<calyx::ScanResult> {
    ScanCoordinator::with_classifier(config, Arc::new(MagicClassifier::new())).run()
}

fn rows(db_path: &Path) -> Vec<Row> {
    let conn = Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT path, parent, name, size, extension, is_dir, short_classification, \
             classification FROM file_info ORDER BY path",
        )
        .unwrap();
    stmt.query_map([], |row| {
        Ok(Row {
            path: row.get(0)?,
            parent: row.get(1)?,
            name: row.get(2)?,
            size: row.get(3)?,
            extension: row.get(4)?,
            is_dir: row.get(5)?,
            short_classification: row.get(6)?,
            classification: row.get(7)?,
        })
    })
    .unwrap()
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

fn count_rows(db_path: &Path) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM file_info", [], |row| row.get(0))
        .unwrap()
}

fn scan_info(db_path: &Path, key: &str) -> Option<String> {
    let conn = Connection::open(db_path).unwrap();
    schema::get_scan_info(&conn, key).unwrap()
}

fn text(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_scan_same_rows_for_any_worker_count() {
    let (dir, root) = data_tree();
    let sub = root.join("sub");

    for workers in [1, 4, 16] {
        let db_path = dir.path().join(format!("scan-{}.db", workers));
        let result = scan(scan_config(&root, &db_path, workers, WriteMode::Replace)).unwrap();

        assert!(result.completed);
        assert_eq!(result.entries_emitted, 4);
        assert_eq!(result.rows_committed, 4);
        assert_eq!(result.total_dirs, 2);
        assert_eq!(result.total_files, 2);
        assert_eq!(result.total_bytes, 10);

        let expected = vec![
            Row {
                path: text(&root),
                parent: text(&root),
                name: String::new(),
                size: rows(&db_path)[0].size,
                extension: String::new(),
                is_dir: true,
                short_classification: "directory".into(),
                classification: "directory".into(),
            },
            Row {
                path: text(&root.join("notes.txt")),
                parent: text(&root),
                name: "notes.txt".into(),
                size: 10,
                extension: "txt".into(),
                is_dir: false,
                short_classification: "ASCII text".into(),
                classification: "ASCII text".into(),
            },
            Row {
                path: text(&sub),
                parent: text(&root),
                name: "sub".into(),
                size: rows(&db_path)[2].size,
                extension: String::new(),
                is_dir: true,
                short_classification: "directory".into(),
                classification: "directory".into(),
            },
            Row {
                path: text(&sub.join("a.bin")),
                parent: text(&sub),
                name: "a.bin".into(),
                size: 0,
                extension: "bin".into(),
                is_dir: false,
                short_classification: "empty".into(),
                classification: "empty".into(),
            },
        ];
        assert_eq!(rows(&db_path), expected, "workers = {}", workers);
    }
}

#[test]
fn test_modification_time_is_rfc3339() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");
    scan(scan_config(&root, &db_path, 2, WriteMode::Replace)).unwrap();

    let conn = Connection::open(&db_path).unwrap();
    let time: String = conn
        .query_row(
            "SELECT time FROM file_info WHERE name = 'notes.txt'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(&time).is_ok());
}

#[test]
fn test_scan_info_recorded() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");
    scan(scan_config(&root, &db_path, 3, WriteMode::Replace)).unwrap();

    assert_eq!(scan_info(&db_path, keys::STATUS).as_deref(), Some("completed"));
    assert_eq!(scan_info(&db_path, keys::TOTAL_ENTRIES).as_deref(), Some("4"));
    assert_eq!(scan_info(&db_path, keys::ROWS_COMMITTED).as_deref(), Some("4"));
    assert_eq!(scan_info(&db_path, keys::WRITE_MODE).as_deref(), Some("replace"));
    assert_eq!(scan_info(&db_path, keys::WORKER_COUNT).as_deref(), Some("3"));
    assert_eq!(scan_info(&db_path, keys::ROOT), Some(text(&root)));

    let conn = Connection::open(&db_path).unwrap();
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_file_info_%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 4);
}

#[test]
fn test_replace_twice_keeps_row_count() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    scan(scan_config(&root, &db_path, 4, WriteMode::Replace)).unwrap();
    scan(scan_config(&root, &db_path, 4, WriteMode::Replace)).unwrap();

    assert_eq!(count_rows(&db_path), 4);
}

#[test]
fn test_upsert_twice_has_no_duplicate_paths() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    scan(scan_config(&root, &db_path, 4, WriteMode::Upsert)).unwrap();
    fs::write(root.join("notes.txt"), b"0123456789abcdef").unwrap();
    scan(scan_config(&root, &db_path, 4, WriteMode::Upsert)).unwrap();

    assert_eq!(count_rows(&db_path), 4);
    let notes = rows(&db_path)
        .into_iter()
        .find(|r| r.name == "notes.txt")
        .unwrap();
    assert_eq!(notes.size, 16);
}

#[test]
fn test_append_twice_doubles_rows() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    scan(scan_config(&root, &db_path, 2, WriteMode::Append)).unwrap();
    scan(scan_config(&root, &db_path, 2, WriteMode::Append)).unwrap();

    assert_eq!(count_rows(&db_path), 8);
}

/// Fails for every `.txt` file
struct NoTextClassifier;

impl Classifier for NoTextClassifier {
    fn classify(&self, path: &Path) -> Result<String, ClassifyError> {
        if path.extension().is_some_and(|e| e == "txt") {
            return Err(ClassifyError::Command {
                path: path.to_path_buf(),
                reason: "refused".into(),
            });
        }
        MagicClassifier::new().classify(path)
    }
}

#[test]
fn test_classifier_failure_still_persists_entry() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    let coordinator = ScanCoordinator::with_classifier(
        scan_config(&root, &db_path, 2, WriteMode::Replace),
        Arc::new(NoTextClassifier),
    );
    let result = coordinator.run().unwrap();

    assert_eq!(result.rows_committed, 4);
    assert_eq!(result.classify_failures, 1);

    let notes = rows(&db_path)
        .into_iter()
        .find(|r| r.name == "notes.txt")
        .unwrap();
    assert_eq!(notes.classification, "");
    assert_eq!(notes.short_classification, "");
    assert_eq!(notes.extension, "txt");
    assert_eq!(scan_info(&db_path, keys::CLASSIFY_FAILURES).as_deref(), Some("1"));
}

#[cfg(unix)]
#[test]
fn test_failing_file_command() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    let coordinator = ScanCoordinator::with_classifier(
        scan_config(&root, &db_path, 2, WriteMode::Replace),
        Arc::new(FileCommandClassifier::new("false")),
    );
    let result = coordinator.run().unwrap();

    assert_eq!(result.classify_failures, 4);
    assert!(rows(&db_path).iter().all(|r| r.classification.is_empty()));
}

#[test]
fn test_root_not_a_directory() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");
    let file = root.join("notes.txt");

    let err = scan(scan_config(&file, &db_path, 2, WriteMode::Replace)).unwrap_err();
    assert!(matches!(err, ScanError::Walk(WalkError::NotADirectory { .. })));
    assert_eq!(scan_info(&db_path, keys::STATUS).as_deref(), Some("failed"));
    assert_eq!(count_rows(&db_path), 0);
}

#[test]
fn test_invalid_root_rejected_by_config() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing");

    let args = CliArgs::try_parse_from(["calyx", missing.to_str().unwrap()]).unwrap();
    let err = ScanConfig::from_args(args).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRoot { .. }));
}

#[test]
fn test_interrupted_scan_status() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    let coordinator = ScanCoordinator::with_classifier(
        scan_config(&root, &db_path, 2, WriteMode::Replace),
        Arc::new(MagicClassifier::new()),
    );
    coordinator.shutdown_flag().store(true, Ordering::SeqCst);

    let result = coordinator.run().unwrap();
    assert!(!result.completed);
    assert_eq!(scan_info(&db_path, keys::STATUS).as_deref(), Some("interrupted"));
}

#[test]
fn test_exclude_pattern_skips_subtree() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    let mut config = scan_config(&root, &db_path, 2, WriteMode::Replace);
    config.exclude_patterns = vec![regex::Regex::new(r"/sub$").unwrap()];
    scan(config).unwrap();

    let names: Vec<String> = rows(&db_path).into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["", "notes.txt"]);
}

#[test]
fn test_progress_callback_runs() {
    let (dir, root) = data_tree();
    let db_path = dir.path().join("scan.db");

    let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let counter = Arc::clone(&calls);

    let coordinator = ScanCoordinator::with_classifier(
        scan_config(&root, &db_path, 2, WriteMode::Replace),
        Arc::new(MagicClassifier::new()),
    );
    let result = coordinator
        .run_with_progress(move |p| {
            assert_eq!(p.total_workers, 2);
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    assert!(result.completed);
    assert!(calls.load(Ordering::Relaxed) >= 1);
}

/// `dirs` directories under `root`, each holding `files` small text files
fn wide_tree(root: &Path, dirs: usize, files: usize) -> u64 {
    for d in 0..dirs {
        let dir = root.join(format!("d{:03}", d));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files {
            fs::write(dir.join(format!("f{:04}.txt", f)), b"calyx\n").unwrap();
        }
    }
    (1 + dirs + dirs * files) as u64
}

fn distinct_paths(db_path: &Path) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row("SELECT COUNT(DISTINCT path) FROM file_info", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn test_many_workers_store_every_entry() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("data");
    let expected = wide_tree(&root, 20, 100);
    let db_path = dir.path().join("scan.db");

    let mut config = scan_config(&root, &db_path, 8, WriteMode::Replace);
    config.commit_interval = 50;
    let result = scan(config).unwrap();

    assert!(result.completed);
    assert_eq!(result.entries_emitted, expected);
    assert_eq!(result.entries_processed, expected);
    assert_eq!(result.rows_committed, expected);
    assert_eq!(result.insert_failures, 0);

    assert_eq!(count_rows(&db_path), expected as i64);
    assert_eq!(distinct_paths(&db_path), expected as i64);
    assert_eq!(scan_info(&db_path, keys::STATUS).as_deref(), Some("completed"));
    assert_eq!(
        scan_info(&db_path, keys::ROWS_COMMITTED),
        Some(expected.to_string())
    );
}

/// Magic classification after a fixed delay per entry
struct SlowClassifier;

impl Classifier for SlowClassifier {
    fn classify(&self, path: &Path) -> Result<String, ClassifyError> {
        std::thread::sleep(std::time::Duration::from_millis(1));
        MagicClassifier::new().classify(path)
    }
}

#[test]
fn test_slow_workers_share_write_lock() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("data");
    let expected = wide_tree(&root, 3, 1000);
    let db_path = dir.path().join("scan.db");

    // Scanning takes longer than the lock wait, so no worker may keep the
    // write lock while it classifies
    let mut config = scan_config(&root, &db_path, 4, WriteMode::Upsert);
    config.commit_interval = 1000;
    config.busy_timeout = std::time::Duration::from_millis(500);

    let coordinator = ScanCoordinator::with_classifier(config, Arc::new(SlowClassifier));
    let result = coordinator.run().unwrap();

    assert!(result.completed);
    assert_eq!(result.rows_committed, expected);
    assert_eq!(count_rows(&db_path), expected as i64);
    assert_eq!(distinct_paths(&db_path), expected as i64);
    assert_eq!(scan_info(&db_path, keys::STATUS).as_deref(), Some("completed"));
}
