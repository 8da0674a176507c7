//! Snapshot schema introspection
//!
//! Everything here runs before the record query is prepared, so a bad
//! table or column name never reaches the SQL text.

use crate::reader::{ReaderError, ReaderResult};
use rusqlite::{params, Connection};
use std::path::Path;

/// Confirm the file is a readable SQLite database.
///
/// Opening is lazy in SQLite; the first read of `sqlite_master` is what
/// fails for a non-database file.
pub(super) fn probe(conn: &Connection, path: &Path) -> ReaderResult<()> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|_| ())
    .map_err(|e| {
        ReaderError::Connection(format!(
            "{} is not a readable snapshot: {}",
            path.display(),
            e
        ))
    })
}

/// Names of all tables and views
pub(super) fn list_tables(conn: &Connection) -> ReaderResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(read_error)?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(read_error)?;

    rows.collect::<Result<Vec<_>, _>>().map_err(read_error)
}

/// Column names of `table`; empty if the table does not exist
pub(super) fn table_columns(conn: &Connection, table: &str) -> ReaderResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(read_error)?;

    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(read_error)?;

    rows.collect::<Result<Vec<_>, _>>().map_err(read_error)
}

/// Check that `table` exists and has every requested column
pub(super) fn validate(conn: &Connection, table: &str, columns: &[String]) -> ReaderResult<()> {
    let available = table_columns(conn, table)?;

    if available.is_empty() {
        let tables = list_tables(conn)?;
        return Err(ReaderError::Configuration(format!(
            "table '{}' does not exist in the snapshot (available: {})",
            table,
            tables.join(", ")
        )));
    }

    let missing: Vec<&str> = columns
        .iter()
        .filter(|c| !available.iter().any(|a| a.eq_ignore_ascii_case(c)))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        return Err(ReaderError::Configuration(format!(
            "table '{}' has no column(s) {} (available: {})",
            table,
            missing.join(", "),
            available.join(", ")
        )));
    }

    Ok(())
}

/// Name that reaches the real rowid of `table`.
///
/// A user column called `rowid` hides the built-in one; SQLite keeps
/// `_rowid_` and `oid` as fallbacks.
pub(super) fn rowid_alias(conn: &Connection, table: &str) -> ReaderResult<&'static str> {
    let columns = table_columns(conn, table)?;

    ROWID_ALIASES
        .into_iter()
        .find(|alias| !columns.iter().any(|c| c.eq_ignore_ascii_case(alias)))
        .ok_or_else(|| {
            ReaderError::Configuration(format!(
                "table '{}' defines columns named {}, so its rows cannot be stepped through",
                table,
                ROWID_ALIASES.join(", ")
            ))
        })
}

const ROWID_ALIASES: [&str; 3] = ["rowid", "_rowid_", "oid"];

/// Kismet log format version from the `KISMET` metadata table, if present
pub(super) fn kismet_db_version(conn: &Connection) -> Option<i64> {
    conn.query_row("SELECT db_version FROM KISMET LIMIT 1", [], |row| row.get(0))
        .ok()
}

/// Quote an identifier for inclusion in SQL text
pub(super) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn read_error(e: rusqlite::Error) -> ReaderError {
    ReaderError::Connection(format!("failed to read snapshot schema: {}", e))
}
