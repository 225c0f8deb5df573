use super::StoreError;
use rusqlite::Connection;
use tracing::info;

/// Version stamped into `PRAGMA user_version` once the upgrade has run
pub const SCHEMA_VERSION: i64 = 1;

/// Brings the store up to `SCHEMA_VERSION`
///
/// Safe to call on every open: each step only runs when the stored version is
/// below it. A store written by a newer build is refused.
pub fn upgrade(conn: &Connection) -> Result<i64, StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::Unavailable(format!(
            "store schema version {} is newer than supported version {}",
            current, SCHEMA_VERSION
        )));
    }

    if current < 1 {
        info!("Upgrading store schema from version {} to 1", current);
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS sections (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 title TEXT NOT NULL DEFAULT '',
                 content TEXT NOT NULL DEFAULT '',
                 links TEXT NOT NULL DEFAULT '[]',
                 notes TEXT NOT NULL DEFAULT '[]',
                 created INTEGER NOT NULL,
                 updated INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_sections_title ON sections(title);
             PRAGMA user_version = 1;
             COMMIT;",
        )?;
    }

    Ok(SCHEMA_VERSION)
}
