use super::{CacheError, Response};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const LIVE_BUCKET_KEY: &str = "live_bucket";

fn create_tables(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_buckets (
             name TEXT PRIMARY KEY,
             created_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS cache_entries (
             bucket TEXT NOT NULL,
             url TEXT NOT NULL,
             status INTEGER NOT NULL,
             headers TEXT NOT NULL,
             body BLOB NOT NULL,
             stored_at INTEGER NOT NULL,
             PRIMARY KEY (bucket, url),
             FOREIGN KEY (bucket) REFERENCES cache_buckets(name) ON DELETE CASCADE
         );
         CREATE TABLE IF NOT EXISTS cache_state (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );",
    )?;
    Ok(())
}

/// Named buckets of stored responses, plus which bucket is live
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct CacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStorage {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            info!("Opening offline cache storage: {:?}", path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| CacheError::Unavailable(e.to_string()))?;
                }
            }
            let conn = Connection::open(&path)?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Self::from_connection(conn)
        })
        .await
        .map_err(|e| CacheError::Aborted(e.to_string()))?
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        create_tables(&conn)?;
        Ok(CacheStorage {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CacheError::Aborted("cache connection poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| CacheError::Aborted(e.to_string()))?
    }

    /// Creates (or refills) a bucket with every entry in one transaction
    pub async fn put_bucket(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), CacheError> {
        let bucket = bucket.to_string();
        self.run(move |conn| {
            let now = Utc::now().timestamp_millis();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                params![&bucket, now],
            )?;
            for (url, response) in &entries {
                tx.execute(
                    "INSERT OR REPLACE INTO cache_entries (bucket, url, status, headers, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        &bucket,
                        url,
                        response.status,
                        serde_json::to_string(&response.headers)?,
                        &response.body,
                        now,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Looks up a stored response
    ///
    /// Returns None if the bucket has no entry for `url`.
    pub async fn match_entry(&self, bucket: &str, url: &str) -> Result<Option<Response>, CacheError> {
        let bucket = bucket.to_string();
        let url = url.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, headers, body FROM cache_entries WHERE bucket = ?1 AND url = ?2",
                    params![&bucket, &url],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    },
                )
                .optional()?;

            match row {
                Some((status, headers, body)) => Ok(Some(Response {
                    status,
                    headers: serde_json::from_str(&headers)?,
                    body,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }

    pub async fn entry_count(&self, bucket: &str) -> Result<usize, CacheError> {
        let bucket = bucket.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1",
                params![&bucket],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn live_bucket(&self) -> Result<Option<String>, CacheError> {
        self.run(|conn| {
            let live = conn
                .query_row(
                    "SELECT value FROM cache_state WHERE key = ?1",
                    params![LIVE_BUCKET_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(live)
        })
        .await
    }

    /// Makes `bucket` the only bucket and marks it live
    ///
    /// Returns the names of the buckets that were dropped.
    pub async fn promote(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
        let bucket = bucket.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM cache_buckets WHERE name = ?1",
                    params![&bucket],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(CacheError::MissingBucket(bucket));
            }

            let stale = {
                let mut stmt = tx.prepare("SELECT name FROM cache_buckets WHERE name != ?1")?;
                let names = stmt
                    .query_map(params![&bucket], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                names
            };
            tx.execute("DELETE FROM cache_buckets WHERE name != ?1", params![&bucket])?;
            tx.execute(
                "INSERT OR REPLACE INTO cache_state (key, value) VALUES (?1, ?2)",
                params![LIVE_BUCKET_KEY, &bucket],
            )?;
            tx.commit()?;
            Ok(stale)
        })
        .await
    }
}
