//! Section store: an SQLite-backed document collection behind an async handle.
//!
//! Each operation is a single transaction. A caller that reads a section,
//! changes it and writes it back with [`StoreHandle::replace`] gets no
//! atomicity across the two steps: if two such sequences interleave on the
//! same id, the later `replace` wins and the earlier change is lost.
//! [`StoreHandle::append_note`] and [`StoreHandle::append_link`] perform the
//! read-modify-write inside one transaction instead.

mod schema;
mod sections;

use crate::models::{now_millis, Link, Section, SectionInput};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

pub use schema::{upgrade, SCHEMA_VERSION};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Store task aborted: {0}")]
    Aborted(String),
}

impl From<StoreError> for crate::NotebookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => crate::NotebookError::StoreUnavailable(msg),
            other => crate::NotebookError::TransactionFailed(other.to_string()),
        }
    }
}

/// Handle to an open section store
///
/// Cheap to clone; every clone shares the same connection.
#[derive(Clone)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl StoreHandle {
    /// Opens the store at `path`, creating and upgrading it as needed
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let handle = tokio::task::spawn_blocking(move || Self::open_blocking(path))
            .await
            .map_err(|e| StoreError::Aborted(e.to_string()))??;
        Ok(handle)
    }

    /// Opens a private in-memory store
    pub async fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::from_connection(conn, None).map_err(Into::into)
    }

    fn open_blocking(path: PathBuf) -> Result<Self, StoreError> {
        info!("Opening section store: {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create store directory {:?}: {}", parent, e);
                    StoreError::Unavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| {
            error!("Failed to open store {:?}: {}", path, e);
            StoreError::Unavailable(e.to_string())
        })?;

        // journal_mode returns a row, so it goes through query_row
        let _journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::from_connection(conn, Some(path))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        let version = upgrade(&conn).map_err(|e| match e {
            StoreError::Unavailable(msg) => StoreError::Unavailable(msg),
            other => StoreError::Unavailable(format!("schema upgrade failed: {}", other)),
        })?;
        info!("Section store ready at schema version {}", version);

        Ok(StoreHandle {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Path of the backing file, None for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn run<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Aborted("store connection poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Aborted(e.to_string()))?;

        result.map_err(|e| {
            error!("Store operation failed: {}", e);
            e.into()
        })
    }

    /// Inserts a new section; the store assigns its id
    pub async fn create(&self, input: SectionInput) -> crate::Result<i64> {
        let section = Section::new(input, now_millis());
        let id = self.run(move |conn| sections::insert(conn, &section)).await?;
        debug!("Created section {}", id);
        Ok(id)
    }

    /// Overwrites the whole record under `section.id`, inserting it if absent
    pub async fn replace(&self, section: Section) -> crate::Result<i64> {
        self.run(move |conn| sections::put(conn, &section)).await
    }

    /// Removes a section; absent ids are ignored
    pub async fn remove(&self, id: i64) -> crate::Result<()> {
        self.run(move |conn| sections::delete(conn, id)).await?;
        debug!("Removed section {}", id);
        Ok(())
    }

    /// Every section, in no particular order
    pub async fn get_all(&self) -> crate::Result<Vec<Section>> {
        self.run(|conn| sections::list(conn)).await
    }

    pub async fn get_one(&self, id: i64) -> crate::Result<Option<Section>> {
        self.run(move |conn| sections::get(conn, id)).await
    }

    /// Sections whose title matches exactly
    pub async fn find_by_title(&self, title: &str) -> crate::Result<Vec<Section>> {
        let title = title.to_string();
        self.run(move |conn| sections::list_by_title(conn, &title)).await
    }

    /// Appends a note atomically. Returns the updated section, or None if absent.
    pub async fn append_note(&self, id: i64, text: &str) -> crate::Result<Option<Section>> {
        let text = text.to_string();
        self.run(move |conn| sections::append_note(conn, id, &text, now_millis()))
            .await
    }

    /// Appends a link atomically. Returns the updated section, or None if absent.
    pub async fn append_link(&self, id: i64, link: Link) -> crate::Result<Option<Section>> {
        self.run(move |conn| sections::append_link(conn, id, link, now_millis()))
            .await
    }
}
