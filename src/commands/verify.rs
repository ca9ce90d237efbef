// ABOUTME: Verify command implementation - checks the result of blob extraction
// ABOUTME: Every file column must be NULL or a path to an existing upload

use crate::blob::{BlobWriter, FsBlobWriter};
use crate::config::MigrationConfig;
use crate::sqlite::{self, OPGRANTS_MANIFEST};
use crate::utils::{self, RetryPolicy};
use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use std::path::Path;
use std::time::Duration;

/// Findings of one verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub rows: usize,
    pub paths_ok: usize,
    pub nulls: usize,
    /// Fields still holding binary data
    pub binaries: Vec<String>,
    /// Paths whose file is absent from disk
    pub missing_files: Vec<String>,
    /// Text that is not a path under the uploads directory
    pub foreign_values: Vec<String>,
}

impl VerifyReport {
    pub fn problems(&self) -> usize {
        self.binaries.len() + self.missing_files.len() + self.foreign_values.len()
    }
}

/// Inspect every file column of the database at `path`
pub fn inspect(
    path: &Path,
    writer: &FsBlobWriter,
    busy_timeout: Duration,
    retry: &RetryPolicy,
) -> Result<VerifyReport> {
    let conn = sqlite::open_read_only(path, busy_timeout, retry)?;
    let read = sqlite::checked_columns(&conn, &OPGRANTS_MANIFEST).and_then(|columns| {
        sqlite::read_rows(&conn, OPGRANTS_MANIFEST.table, &columns)
    });
    sqlite::close(conn, "source")?;
    let rows = read?;

    let mut report = VerifyReport {
        rows: rows.len(),
        ..VerifyReport::default()
    };
    let progress = utils::progress_bar(rows.len() as u64)?;

    for (ordinal, row) in rows.iter().enumerate() {
        let label = row.label(ordinal);
        for (column, value) in row.fields() {
            if !sqlite::is_file_column(column) {
                continue;
            }
            let at = format!("{} {}", label, column);
            match value {
                Value::Null => report.nulls += 1,
                Value::Text(text) if text.trim().is_empty() => report.nulls += 1,
                Value::Text(text) if writer.is_managed_path(text) => {
                    if writer.resolve(text).is_file() {
                        report.paths_ok += 1;
                    } else {
                        report.missing_files.push(format!("{} -> {}", at, text));
                    }
                }
                Value::Blob(_) => report.binaries.push(at),
                Value::Text(_) | Value::Integer(_) | Value::Real(_) => {
                    report.foreign_values.push(at)
                }
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message("Verification complete");
    Ok(report)
}

/// Verify the configured database after extraction
///
/// Fails when any file column still holds binary data, points at a missing
/// file, or holds something that is not an upload path.
pub async fn verify(config: &MigrationConfig) -> Result<VerifyReport> {
    tracing::info!("Starting extraction verification...");
    tracing::info!("");

    let path = config.sqlite.path.clone();
    let writer = FsBlobWriter::from_config(&config.uploads);
    let busy_timeout = config.sqlite.busy_timeout();
    let retry = config.retry.clone();

    let report = tokio::task::spawn_blocking(move || inspect(&path, &writer, busy_timeout, &retry))
        .await
        .context("Verification task panicked")??;

    for at in &report.binaries {
        tracing::error!("  ✗ {}: still binary", at);
    }
    for at in &report.missing_files {
        tracing::error!("  ✗ {}: file not found", at);
    }
    for at in &report.foreign_values {
        tracing::error!("  ✗ {}: not an upload path", at);
    }

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Verification Summary");
    tracing::info!("========================================");
    tracing::info!("Rows: {}", report.rows);
    tracing::info!("✓ Paths resolved: {}", report.paths_ok);
    tracing::info!("NULL fields: {}", report.nulls);
    tracing::info!("✗ Problems: {}", report.problems());
    tracing::info!("========================================");
    tracing::info!("");

    if report.problems() > 0 {
        tracing::error!("⚠ EXTRACTION ISSUES DETECTED!");
        tracing::info!("Possible causes:");
        tracing::info!("  - extract-blobs has not been run against this database");
        tracing::info!("  - Upload files were moved or deleted after extraction");
        tracing::info!("  - [uploads] settings differ from the ones used for extraction");
        bail!("{} file field(s) failed verification", report.problems());
    }

    tracing::info!("✅ Verification complete - all file fields resolve");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::Layout;
    use rusqlite::Connection;

    #[test]
    fn test_inspect_classifies_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("kaddep.db");
        let writer = FsBlobWriter::new(dir.path(), "uploads", "jpg");
        writer.prepare().unwrap();
        let stored = writer.write_blob(b"\xff\xd8\xff").unwrap();

        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(&OPGRANTS_MANIFEST.create_table_sql(Layout::Path))
            .unwrap();
        conn.execute(
            "INSERT INTO opgrants (firstName, lastName, dob, gender, phone, \
             ownerPassportPhotoUrl, idDocPhotoUrl, certPhotoUrl, groupPhotoUrl, taxRegPhotoUrl) \
             VALUES ('A', 'B', '1990-01-01', 'Male', '080', ?1, 'uploads/gone.jpg', ?2, 'C:/photo.png', '')",
            rusqlite::params![stored, vec![1u8, 2, 3]],
        )
        .unwrap();
        drop(conn);

        let report = inspect(&db, &writer, Duration::from_millis(100), &RetryPolicy::none()).unwrap();

        assert_eq!(report.rows, 1);
        assert_eq!(report.paths_ok, 1);
        assert_eq!(report.missing_files.len(), 1);
        assert_eq!(report.binaries, vec!["id=1 certPhotoUrl".to_string()]);
        assert_eq!(report.foreign_values, vec!["id=1 groupPhotoUrl".to_string()]);
        // blank text counts as no image
        assert_eq!(report.nulls, 4);
        assert_eq!(report.problems(), 3);
    }
}
