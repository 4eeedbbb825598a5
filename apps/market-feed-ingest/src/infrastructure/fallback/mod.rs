//! Fallback Store
//!
//! Durable, ordered staging area for batch payloads the sink refused. Backed
//! by a single SQLite table:
//!
//! ```sql
//! CREATE TABLE data (id INTEGER PRIMARY KEY AUTOINCREMENT, query TEXT)
//! ```
//!
//! Each operation is one transaction, so the dispatcher (appending) and the
//! drain loop (reading and deleting) never observe a partial row. The row
//! count is capped; inserts past the cap are logged and discarded.
//!
//! SQLite calls are blocking and run on the blocking thread pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::BatchPayload;

/// Default on-disk location of the store.
pub const DEFAULT_FALLBACK_PATH: &str = "sqlite_db/failed_to_push_data.sqlite";

/// Default row cap.
pub const DEFAULT_MAX_ROWS: u64 = 100_000_000;

/// Errors from the fallback store.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// SQLite reported an error.
    #[error("fallback database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("failed to prepare fallback directory {path}: {source}")]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The blocking task running the query panicked or was cancelled.
    #[error("fallback task failed: {0}")]
    Task(String),
}

/// A persisted payload awaiting redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRecord {
    /// Row id, increasing in insertion order.
    pub id: i64,
    /// The payload exactly as it was attempted.
    pub payload: BatchPayload,
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Payload persisted under this row id.
    Stored(i64),
    /// Store is at capacity; payload discarded.
    Rejected {
        /// Row count at the time of rejection.
        count: u64,
    },
}

/// SQLite-backed fallback store. Cheap to clone.
#[derive(Clone)]
pub struct FallbackStore {
    conn: Arc<Mutex<Connection>>,
    max_rows: u64,
}

impl std::fmt::Debug for FallbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackStore")
            .field("max_rows", &self.max_rows)
            .finish_non_exhaustive()
    }
}

impl FallbackStore {
    /// Open (or create) the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: impl AsRef<Path>, max_rows: u64) -> Result<Self, FallbackError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| FallbackError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Fallback journal mode set");
        let store = Self::with_connection(conn, max_rows)?;

        tracing::info!(path = %path.display(), max_rows, "Fallback store ready");
        Ok(store)
    }

    /// Open an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory(max_rows: u64) -> Result<Self, FallbackError> {
        Self::with_connection(Connection::open_in_memory()?, max_rows)
    }

    fn with_connection(conn: Connection, max_rows: u64) -> Result<Self, FallbackError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_rows,
        })
    }

    /// Persist a payload unless the store is full.
    ///
    /// A full store is not an error: the payload is dropped, an error is
    /// logged, and [`InsertOutcome::Rejected`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if SQLite fails.
    pub async fn insert(&self, payload: &BatchPayload) -> Result<InsertOutcome, FallbackError> {
        let text = payload.as_str().to_owned();
        let max_rows = self.max_rows;

        let outcome = self
            .blocking(move |conn| {
                let tx = conn.transaction()?;
                let count = row_count(&tx)?;
                if count >= max_rows {
                    return Ok(InsertOutcome::Rejected { count });
                }
                tx.execute("INSERT INTO data (query) VALUES (?1)", params![text])?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(InsertOutcome::Stored(id))
            })
            .await?;

        match outcome {
            InsertOutcome::Stored(id) => {
                tracing::debug!(id, bytes = payload.len(), "Payload staged in fallback store");
            }
            InsertOutcome::Rejected { count } => {
                tracing::error!(
                    count,
                    max_rows,
                    "Fallback store at capacity, discarding payload"
                );
            }
        }

        Ok(outcome)
    }

    /// Every staged payload in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub async fn fetch_all(&self) -> Result<Vec<FallbackRecord>, FallbackError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id, query FROM data ORDER BY id ASC")?;
            let rows = stmt.query_map([], |row| {
                let query: Option<String> = row.get(1)?;
                Ok(FallbackRecord {
                    id: row.get(0)?,
                    payload: BatchPayload::from_stored(query.unwrap_or_default()),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
    }

    /// Look up one row.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub async fn get(&self, id: i64) -> Result<Option<FallbackRecord>, FallbackError> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, query FROM data WHERE id = ?1",
                params![id],
                |row| {
                    let query: Option<String> = row.get(1)?;
                    Ok(FallbackRecord {
                        id: row.get(0)?,
                        payload: BatchPayload::from_stored(query.unwrap_or_default()),
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// Delete a row after its payload was delivered. Returns whether a row
    /// was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub async fn delete(&self, id: i64) -> Result<bool, FallbackError> {
        self.blocking(move |conn| {
            let removed = conn.execute("DELETE FROM data WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }

    /// Current row count.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub async fn count(&self) -> Result<u64, FallbackError> {
        self.blocking(|conn| row_count(conn)).await
    }

    /// Reclaim space left by deleted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub async fn compact(&self) -> Result<(), FallbackError> {
        self.blocking(|conn| conn.execute_batch("VACUUM;")).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, FallbackError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| FallbackError::Task(e.to_string()))?
        .map_err(FallbackError::from)
    }
}

fn row_count(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or_default())
}
