//! SQLite-backed profile cache
//!
//! Features:
//! - WAL mode with one writer connection and a pool of read-only
//!   connections, so a `get` never queues behind a `put` in progress
//! - One transaction per `put`, so a snapshot is replaced all at once
//! - Auto-recovery on corruption

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chartwatch_core::{ChartProfile, ChartReference, ObjectKey, RepositorySnapshot};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ProfileCache;
use crate::error::{RepoError, Result};

/// How long a connection waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle read connections kept open between calls
const MAX_IDLE_READERS: usize = 4;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        profiles TEXT NOT NULL,
        unavailable TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (namespace, name)
    );

    CREATE TABLE IF NOT EXISTS chart_values (
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        chart TEXT NOT NULL,
        version TEXT NOT NULL,
        payload BLOB NOT NULL,
        PRIMARY KEY (namespace, name, chart, version)
    );
"#;

/// SQLite cache for repository snapshots
#[derive(Clone)]
pub struct SqliteCache {
    writer: Arc<Mutex<Connection>>,
    /// Read-only connections to the same file; `None` for in-memory
    /// databases, which can only be reached through the writer
    readers: Option<Arc<ReaderPool>>,
}

struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn checkout(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().map_err(poisoned)?.pop() {
            return Ok(conn);
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_READERS {
                idle.push(conn);
            }
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RepoError {
    RepoError::CacheError {
        message: format!("cache lock poisoned: {}", e),
    }
}

impl SqliteCache {
    /// Open or create cache at specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = match Self::open_writer(path) {
            Ok(conn) => conn,
            Err(e) => {
                // A damaged file may open fine and only fail on the first
                // statement, so anything up to the schema counts
                tracing::warn!("Cache corrupted, recreating: {}", e);
                remove_database(path)?;
                Self::open_writer(path)?
            }
        };

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: Some(Arc::new(ReaderPool {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::new()),
            })),
        })
    }

    /// Open in-memory cache (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: None,
        })
    }

    fn open_writer(path: &Path) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Run a blocking closure against the writer connection off the async runtime
    async fn with_writer<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().map_err(poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    /// Run a blocking read against a pooled read-only connection
    async fn with_reader<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let Some(readers) = self.readers.clone() else {
            return self.with_writer(f).await;
        };

        tokio::task::spawn_blocking(move || {
            let mut conn = readers.checkout()?;
            let result = f(&mut conn);
            if result.is_ok() {
                readers.checkin(conn);
            }
            result
        })
        .await?
    }

    /// When the snapshot of a repository was last replaced
    pub async fn updated_at(&self, key: &ObjectKey) -> Result<Option<DateTime<Utc>>> {
        let key = key.clone();
        self.with_reader(move |conn| {
            let ts: Option<i64> = conn
                .query_row(
                    "SELECT updated_at FROM snapshots WHERE namespace = ?1 AND name = ?2",
                    params![key.namespace, key.name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
        })
        .await
    }

    /// Keys with a cached snapshot
    pub async fn keys(&self) -> Result<Vec<ObjectKey>> {
        self.with_reader(|conn| {
            let mut stmt =
                conn.prepare("SELECT namespace, name FROM snapshots ORDER BY namespace, name")?;
            let keys = stmt
                .query_map([], |row| Ok(ObjectKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }
}

/// Remove a database file together with its WAL side files
fn remove_database(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = PathBuf::from(file);
        if file.exists() {
            std::fs::remove_file(&file)?;
        }
    }
    Ok(())
}

#[async_trait]
impl ProfileCache for SqliteCache {
    async fn put(&self, key: &ObjectKey, snapshot: RepositorySnapshot) -> Result<()> {
        let key = key.clone();
        self.with_writer(move |conn| {
            let profiles = serde_json::to_string(&snapshot.profiles)?;
            let unavailable = serde_json::to_string(&snapshot.unavailable)?;

            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chart_values WHERE namespace = ?1 AND name = ?2",
                params![key.namespace, key.name],
            )?;
            tx.execute(
                "DELETE FROM snapshots WHERE namespace = ?1 AND name = ?2",
                params![key.namespace, key.name],
            )?;
            tx.execute(
                "INSERT INTO snapshots (namespace, name, profiles, unavailable, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.namespace, key.name, profiles, unavailable, Utc::now().timestamp()],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chart_values (namespace, name, chart, version, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (chart, versions) in &snapshot.values {
                    for (version, payload) in versions {
                        stmt.execute(params![key.namespace, key.name, chart, version, payload])?;
                    }
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<RepositorySnapshot>> {
        let key = key.clone();
        self.with_reader(move |conn| {
            let tx = conn.transaction()?;

            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT profiles, unavailable FROM snapshots WHERE namespace = ?1 AND name = ?2",
                    params![key.namespace, key.name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((profiles, unavailable)) = row else {
                return Ok(None);
            };

            let profiles: Vec<ChartProfile> = serde_json::from_str(&profiles)?;
            let unavailable: Vec<ChartReference> = serde_json::from_str(&unavailable)?;
            let mut snapshot = RepositorySnapshot {
                profiles,
                unavailable,
                ..Default::default()
            };

            {
                let mut stmt = tx.prepare(
                    "SELECT chart, version, payload FROM chart_values
                     WHERE namespace = ?1 AND name = ?2",
                )?;
                let rows = stmt.query_map(params![key.namespace, key.name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })?;

                for row in rows {
                    let (chart, version, payload) = row?;
                    snapshot.insert_values(&ChartReference::new(chart, version), payload);
                }
            }

            tx.commit()?;
            Ok(Some(snapshot))
        })
        .await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let key = key.clone();
        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chart_values WHERE namespace = ?1 AND name = ?2",
                params![key.namespace, key.name],
            )?;
            tx.execute(
                "DELETE FROM snapshots WHERE namespace = ?1 AND name = ?2",
                params![key.namespace, key.name],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
