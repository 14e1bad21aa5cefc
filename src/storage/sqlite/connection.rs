//! Connection handling for the `SQLite` graph store.
//!
//! Covers opening and configuring connections, acquiring the in-process
//! connection mutex with a bound, and translating `SQLite` failures into the
//! crate error taxonomy.

use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, ffi};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default `SQLite` busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Acquires a mutex with a spin-wait bound.
///
/// `std::sync::Mutex` has no timed lock, so this polls `try_lock` with a
/// short sleep. A poisoned mutex is recovered: every transaction is rolled
/// back when its guard drops, so the connection stays usable.
///
/// # Errors
///
/// Returns [`Error::Busy`] if the lock cannot be acquired within `timeout`.
pub fn acquire_lock_with_timeout<'a, T>(
    mutex: &'a Mutex<T>,
    operation: &str,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>> {
    let start = Instant::now();
    let sleep_duration = Duration::from_millis(2);

    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("SQLite mutex was poisoned, recovering");
                metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
                return Ok(poisoned.into_inner());
            },
            Err(std::sync::TryLockError::WouldBlock) => {
                if start.elapsed() > timeout {
                    metrics::counter!("sqlite_mutex_timeout_total").increment(1);
                    return Err(Error::Busy {
                        operation: operation.to_string(),
                        attempts: 1,
                    });
                }
                std::thread::sleep(sleep_duration);
            },
        }
    }
}

/// Opens a database file, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the directory or file cannot be
/// created or opened.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::StorageUnavailable(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    Connection::open(path)
        .map_err(|e| Error::StorageUnavailable(format!("cannot open {}: {e}", path.display())))
}

/// Configures a connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: readers proceed while one writer holds the lock
/// - **NORMAL synchronous**: durable at checkpoints, fast commits
/// - **`busy_timeout`**: waits for the file lock instead of failing at once
/// - **`foreign_keys`**: edges can never point at deleted nodes
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if foreign keys cannot be enabled,
/// which also catches files that are not databases.
pub fn configure_connection(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
    // journal_mode returns a row ("wal", or "memory" for in-memory databases)
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.busy_timeout(Duration::from_millis(busy_timeout_ms));
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::StorageUnavailable(format!("cannot configure connection: {e}")))
}

/// Maps a `SQLite` failure into the crate error taxonomy.
///
/// | `SQLite` condition | Error |
/// |--------------------|-------|
/// | `BUSY`, `LOCKED`, unique-key race | [`Error::Busy`] (retried) |
/// | `CANTOPEN`, `NOTADB`, `IOERR`, `CORRUPT`, `FULL`, `PERM`, `READONLY` | [`Error::StorageUnavailable`] |
/// | anything else | [`Error::OperationFailed`] |
pub fn sqlite_error(operation: &str, err: &rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = err {
        match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return Error::Busy {
                    operation: operation.to_string(),
                    attempts: 1,
                };
            },
            ErrorCode::ConstraintViolation
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                tracing::debug!(operation, "Unique key race detected, retrying");
                return Error::Busy {
                    operation: operation.to_string(),
                    attempts: 1,
                };
            },
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::DiskFull
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly => {
                return Error::StorageUnavailable(format!("{operation}: {err}"));
            },
            _ => {},
        }
    }

    Error::OperationFailed {
        operation: operation.to_string(),
        cause: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_lock_with_timeout_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let mutex_clone = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard =
                    acquire_lock_with_timeout(&mutex_clone, "test", Duration::from_secs(5))
                        .unwrap();
                *guard += 1;
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*mutex.lock().unwrap(), 10);
    }

    #[test]
    fn test_acquire_lock_with_timeout_recovers_poisoned() {
        let mutex = Arc::new(Mutex::new(7));
        let mutex_clone = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = mutex_clone.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();
        assert!(mutex.is_poisoned());

        let guard = acquire_lock_with_timeout(&mutex, "test", Duration::from_secs(1)).unwrap();
        assert_eq!(*guard, 7);
    }

    #[test]
    fn test_acquire_lock_with_timeout_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock_with_timeout(&mutex, "test", Duration::from_secs(1)).unwrap();
        assert_eq!(*guard, 42);
    }

    #[test]
    fn test_acquire_lock_with_timeout_reports_busy() {
        let mutex = Mutex::new(42);
        let _held = mutex.lock().unwrap();

        let result = acquire_lock_with_timeout(&mutex, "merge_node", Duration::from_millis(20));
        assert!(
            matches!(result, Err(Error::Busy { ref operation, attempts: 1 }) if operation == "merge_node"),
            "expected Busy from a held mutex"
        );
    }

    #[test]
    fn test_configure_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn, DEFAULT_BUSY_TIMEOUT_MS).unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        // In-memory databases cannot use WAL and report "memory"
        assert!(
            journal_mode.eq_ignore_ascii_case("wal") || journal_mode.eq_ignore_ascii_case("memory"),
            "unexpected journal mode '{journal_mode}'"
        );

        let busy_timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_open_connection_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let conn = open_connection(&path).unwrap();
        drop(conn);
        assert!(path.exists());
    }

    #[test]
    fn test_open_connection_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let result = open_connection(dir.path());
        if let Err(err) = result {
            assert!(matches!(err, Error::StorageUnavailable(_)));
        }
    }

    #[test]
    fn test_sqlite_error_classification() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        assert!(matches!(sqlite_error("op", &busy), Error::Busy { .. }));

        let unique = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(matches!(sqlite_error("op", &unique), Error::Busy { .. }));

        let notadb = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_NOTADB), None);
        assert!(matches!(
            sqlite_error("op", &notadb),
            Error::StorageUnavailable(_)
        ));

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(
            sqlite_error("op", &other),
            Error::OperationFailed { .. }
        ));
    }
}
