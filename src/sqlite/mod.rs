// ABOUTME: SQLite access for the opgrants source database and its staging rebuild
// ABOUTME: Opens connections, introspects columns, reads rows, and closes handles explicitly

pub mod manifest;

pub use manifest::{is_file_column, ColumnManifest, ColumnSpec, Layout, SchemaCheck, OPGRANTS_MANIFEST};

use crate::utils::{self, RetryPolicy};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// One row of a table: ordered `(column, value)` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    fields: Vec<(String, Value)>,
}

impl SourceRow {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Row identity for log lines
    pub fn id(&self) -> Option<i64> {
        match self.get("id") {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        }
    }

    /// `id=<n>` or `row #<ordinal>` when the table has no id
    pub fn label(&self, ordinal: usize) -> String {
        match self.id() {
            Some(id) => format!("id={}", id),
            None => format!("row #{}", ordinal + 1),
        }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

/// Open an existing database read-only, retrying per `policy`
pub fn open_read_only(path: &Path, busy_timeout: Duration, policy: &RetryPolicy) -> Result<Connection> {
    utils::validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database '{}' (read-only)", path.display());

    utils::retry_blocking(
        || {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open SQLite database '{}'", path.display()))?;
            conn.busy_timeout(busy_timeout)
                .context("Failed to set SQLite busy timeout")?;
            // Opening is lazy; touch the schema so a corrupt file fails here
            conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })
            .with_context(|| format!("'{}' is not a readable SQLite database", path.display()))?;
            Ok(conn)
        },
        policy,
    )
    .with_context(|| format!("Failed to open '{}' after retries", path.display()))
}

/// Create (or reuse) a writable database file
pub fn open_read_write(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    tracing::info!("Opening SQLite database '{}' (read-write)", path.display());

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to create SQLite database '{}'", path.display()))?;
    conn.busy_timeout(busy_timeout)
        .context("Failed to set SQLite busy timeout")?;
    Ok(conn)
}

/// Close a connection, surfacing errors instead of swallowing them in `Drop`
pub fn close(conn: Connection, what: &str) -> Result<()> {
    conn.close()
        .map_err(|(_, e)| e)
        .with_context(|| format!("Failed to close {} database", what))?;
    tracing::debug!("Closed {} database", what);
    Ok(())
}

/// Column names of `table` in declaration order (empty when it does not exist)
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{}\")", table))
        .with_context(|| format!("Failed to inspect table '{}'", table))?;

    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("Failed to read columns of '{}'", table))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .with_context(|| format!("Failed to read columns of '{}'", table))?;

    Ok(columns)
}

/// Enumerate the live columns and validate them against the manifest
pub fn checked_columns(conn: &Connection, manifest: &ColumnManifest) -> Result<Vec<String>> {
    let columns = table_columns(conn, manifest.table)?;
    let check = manifest
        .check_live_schema(&columns)
        .with_context(|| format!("Schema check failed for table '{}'", manifest.table))?;

    for missing in &check.missing_optional {
        tracing::warn!(
            "⚠ Column '{}' from manifest v{} is absent in the live table; it will take its default",
            missing,
            manifest.version
        );
    }

    Ok(columns)
}

/// Read every row of `table`, selecting exactly `columns`
pub fn read_rows(conn: &Connection, table: &str, columns: &[String]) -> Result<Vec<SourceRow>> {
    let select_list: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    let sql = format!("SELECT {} FROM \"{}\"", select_list.join(", "), table);

    tracing::info!("Reading all rows from '{}'", table);

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to prepare query on '{}'", table))?;

    let rows = stmt
        .query_map([], |row| {
            let mut fields = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                fields.push((name.clone(), row.get::<_, Value>(idx)?));
            }
            Ok(SourceRow::new(fields))
        })
        .with_context(|| format!("Failed to query '{}'", table))?
        .collect::<rusqlite::Result<Vec<SourceRow>>>()
        .with_context(|| format!("Failed to read rows from '{}'", table))?;

    tracing::info!("Read {} rows from '{}'", rows.len(), table);

    Ok(rows)
}

/// Parameterized `INSERT` naming exactly the given columns
pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    let names: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table,
        names.join(", "),
        placeholders
    )
}

/// Printable rendering of values for error logs; blobs are summarized
pub fn describe_values(values: &[Value]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|value| match value {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => format!("{:?}", utils::sanitize_identifier(s)),
            Value::Blob(b) => format!("<blob {} bytes>", b.len()),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}
