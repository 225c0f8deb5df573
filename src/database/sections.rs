use super::StoreError;
use crate::models::{Link, Section};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

const SELECT_COLUMNS: &str = "SELECT id, title, content, links, notes, created, updated FROM sections";

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        links: json_column(row, 3)?,
        notes: json_column(row, 4)?,
        created: row.get(5)?,
        updated: row.get(6)?,
    })
}

/// Inserts a new section and returns the id assigned by the store
///
/// Any id already on `section` is ignored.
pub fn insert(conn: &Connection, section: &Section) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO sections (title, content, links, notes, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &section.title,
            &section.content,
            serde_json::to_string(&section.links)?,
            serde_json::to_string(&section.notes)?,
            section.created,
            section.updated,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Writes the whole record under `section.id`, inserting it if absent
pub fn put(conn: &Connection, section: &Section) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO sections (id, title, content, links, notes, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            section.id,
            &section.title,
            &section.content,
            serde_json::to_string(&section.links)?,
            serde_json::to_string(&section.notes)?,
            section.created,
            section.updated,
        ],
    )?;

    Ok(section.id)
}

/// Deletes a section by ID
///
/// Deleting an id that does not exist is not an error.
pub fn delete(conn: &Connection, id: i64) -> Result<(), StoreError> {
    conn.execute("DELETE FROM sections WHERE id = ?1", params![id])?;
    Ok(())
}

/// Lists every section in storage order
pub fn list(conn: &Connection) -> Result<Vec<Section>, StoreError> {
    let mut stmt = conn.prepare(SELECT_COLUMNS)?;
    let sections = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sections)
}

/// Gets a section by ID
///
/// Returns None if the section doesn't exist.
pub fn get(conn: &Connection, id: i64) -> Result<Option<Section>, StoreError> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    let section = conn.query_row(&sql, params![id], from_row).optional()?;
    Ok(section)
}

/// Lists sections with exactly this title, served by `idx_sections_title`
pub fn list_by_title(conn: &Connection, title: &str) -> Result<Vec<Section>, StoreError> {
    let sql = format!("{} WHERE title = ?1 ORDER BY id", SELECT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let sections = stmt
        .query_map(params![title], from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sections)
}

/// Reads, modifies and writes back one section inside a single write transaction
///
/// Returns None without writing when the section doesn't exist.
pub fn modify<F>(conn: &mut Connection, id: i64, f: F) -> Result<Option<Section>, StoreError>
where
    F: FnOnce(&mut Section),
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut section) = get(&tx, id)? else {
        return Ok(None);
    };
    f(&mut section);
    put(&tx, &section)?;

    tx.commit()?;
    Ok(Some(section))
}

pub fn append_note(
    conn: &mut Connection,
    id: i64,
    text: &str,
    now: i64,
) -> Result<Option<Section>, StoreError> {
    modify(conn, id, |section| section.push_note(text, now))
}

pub fn append_link(
    conn: &mut Connection,
    id: i64,
    link: Link,
    now: i64,
) -> Result<Option<Section>, StoreError> {
    modify(conn, id, |section| section.push_link(link, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::upgrade;
    use crate::models::SectionInput;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        upgrade(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_ignores_caller_id() {
        let conn = conn();
        let mut section = Section::new(SectionInput::titled("a"), 10);
        section.id = 500;

        let id = insert(&conn, &section).unwrap();
        assert_eq!(id, 1);
        assert!(get(&conn, 500).unwrap().is_none());
    }

    #[test]
    fn test_put_inserts_missing_record() {
        let conn = conn();
        let mut section = Section::new(SectionInput::titled("a"), 10);
        section.id = 42;

        assert_eq!(put(&conn, &section).unwrap(), 42);
        assert_eq!(get(&conn, 42).unwrap(), Some(section));

        // The autoincrement counter moves past explicit ids
        let next = insert(&conn, &Section::new(SectionInput::titled("b"), 11)).unwrap();
        assert_eq!(next, 43);
    }

    #[test]
    fn test_list_by_title_allows_duplicates() {
        let conn = conn();
        insert(&conn, &Section::new(SectionInput::titled("dup"), 1)).unwrap();
        insert(&conn, &Section::new(SectionInput::titled("other"), 2)).unwrap();
        insert(&conn, &Section::new(SectionInput::titled("dup"), 3)).unwrap();

        let found = list_by_title(&conn, "dup").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|s| s.title == "dup"));
        assert!(list_by_title(&conn, "none").unwrap().is_empty());
    }

    #[test]
    fn test_modify_missing_section_writes_nothing() {
        let mut conn = conn();
        let result = append_note(&mut conn, 7, "hello", 100).unwrap();
        assert!(result.is_none());
        assert!(list(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_json_column_is_an_error() {
        let conn = conn();
        conn.execute(
            "INSERT INTO sections (title, links, created, updated) VALUES ('x', 'not json', 1, 1)",
            [],
        )
        .unwrap();

        assert!(list(&conn).is_err());
    }
}
