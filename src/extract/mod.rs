// ABOUTME: Blob extraction pipeline for the opgrants table
// ABOUTME: Moves image blobs to files, rebuilds the database with path columns, then swaps it in

pub mod swap;

use crate::blob::{BinaryPayload, BlobWriter};
use crate::config::MigrationConfig;
use crate::sqlite::{self, ColumnManifest, Layout, SourceRow, OPGRANTS_MANIFEST};
use crate::utils::{self, Deadline, RetryPolicy};
use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where and how the extractor runs
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub source: PathBuf,
    pub staging: PathBuf,
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
    pub deadline: Option<Duration>,
}

impl ExtractOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            source: config.sqlite.path.clone(),
            staging: config.sqlite.staging_path(),
            busy_timeout: config.sqlite.busy_timeout(),
            retry: config.retry.clone(),
            deadline: config.run.deadline(),
        }
    }
}

/// Counters for one extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub rows_read: usize,
    pub rows_inserted: usize,
    pub rows_skipped_empty: usize,
    pub rows_failed: usize,
    pub files_written: usize,
    pub fields_nulled: usize,
    pub fields_already_migrated: usize,
    pub backup_path: Option<PathBuf>,
}

pub struct BlobExtractor<W: BlobWriter> {
    options: ExtractOptions,
    writer: W,
    manifest: &'static ColumnManifest,
}

impl<W: BlobWriter> BlobExtractor<W> {
    pub fn new(options: ExtractOptions, writer: W) -> Self {
        Self {
            options,
            writer,
            manifest: &OPGRANTS_MANIFEST,
        }
    }

    /// Run the whole pipeline
    ///
    /// Row and field failures are logged and counted. Any other failure aborts
    /// the run, removes the staging database and leaves the source untouched.
    pub fn run(&self) -> Result<ExtractionReport> {
        if self.options.staging == self.options.source {
            bail!(
                "Staging path '{}' must differ from the source path",
                self.options.staging.display()
            );
        }

        let deadline = Deadline::after(self.options.deadline);

        let result = self.build_staging(&deadline).and_then(|mut report| {
            tracing::info!("Step 4/4: Swapping rebuilt database into place...");
            report.backup_path = Some(swap::finalize_swap(
                &self.options.source,
                &self.options.staging,
            )?);
            Ok(report)
        });

        if result.is_err() {
            self.discard_staging();
        }
        result
    }

    /// Steps 1-3: everything up to and including closing both databases
    fn build_staging(&self, deadline: &Deadline) -> Result<ExtractionReport> {
        let table = self.manifest.table;

        tracing::info!("Step 1/4: Preparing uploads directory...");
        self.writer.prepare()?;

        tracing::info!("Step 2/4: Opening databases...");
        self.remove_stale_staging()?;

        let source = sqlite::open_read_only(
            &self.options.source,
            self.options.busy_timeout,
            &self.options.retry,
        )?;
        let mut staging = sqlite::open_read_write(&self.options.staging, self.options.busy_timeout)?;

        staging
            .execute_batch(&self.manifest.drop_table_sql())
            .with_context(|| format!("Failed to drop '{}' in staging database", table))?;
        staging
            .execute_batch(&self.manifest.create_table_sql(Layout::Path))
            .with_context(|| format!("Failed to create '{}' in staging database", table))?;

        let source_columns = sqlite::checked_columns(&source, self.manifest)?;
        let rows = sqlite::read_rows(&source, table, &source_columns)?;
        let target_columns: HashSet<String> =
            sqlite::table_columns(&staging, table)?.into_iter().collect();

        tracing::info!("Step 3/4: Extracting blobs from {} rows...", rows.len());

        let mut report = ExtractionReport {
            rows_read: rows.len(),
            ..ExtractionReport::default()
        };
        let progress = utils::progress_bar(rows.len() as u64)?;

        // Statement-level failures abort only that INSERT, not the transaction
        let tx = staging
            .transaction()
            .context("Failed to begin staging transaction")?;

        for (ordinal, row) in rows.into_iter().enumerate() {
            deadline.check()?;

            let label = row.label(ordinal);
            let fields = self.transform_row(row, &label, &target_columns, &mut report);
            progress.inc(1);

            if fields.is_empty() {
                report.rows_skipped_empty += 1;
                continue;
            }

            let columns: Vec<&str> = fields.iter().map(|(c, _)| c.as_str()).collect();
            let sql = sqlite::insert_sql(table, &columns);
            let values: Vec<&Value> = fields.iter().map(|(_, v)| v).collect();

            match tx.execute(&sql, rusqlite::params_from_iter(values.iter())) {
                Ok(_) => report.rows_inserted += 1,
                Err(e) => {
                    report.rows_failed += 1;
                    let owned: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
                    tracing::error!("✗ Failed to insert {}: {}", label, e);
                    tracing::error!("  SQL: {}", sql);
                    tracing::error!("  Values: {}", sqlite::describe_values(&owned));
                }
            }
        }

        tx.commit().context("Failed to commit staging database")?;
        progress.finish_with_message("Extraction complete");

        sqlite::close(source, "source")?;
        sqlite::close(staging, "staging")?;

        Ok(report)
    }

    /// Map one source row onto the staging columns
    ///
    /// Only columns present in the staging table with a non-NULL value are
    /// kept. File columns are replaced by a relative path (or NULL when the
    /// blob cannot be extracted); every other value is copied as-is.
    pub fn transform_row(
        &self,
        row: SourceRow,
        label: &str,
        target_columns: &HashSet<String>,
        report: &mut ExtractionReport,
    ) -> Vec<(String, Value)> {
        let mut fields = Vec::new();

        for (column, value) in row.into_fields() {
            if value == Value::Null || !target_columns.contains(&column) {
                continue;
            }

            if sqlite::is_file_column(&column) {
                let converted = self.extract_field(&column, value, label, report);
                fields.push((column, converted));
            } else {
                fields.push((column, value));
            }
        }

        fields
    }

    fn extract_field(
        &self,
        column: &str,
        value: Value,
        label: &str,
        report: &mut ExtractionReport,
    ) -> Value {
        if let Value::Text(text) = &value {
            if self.writer.is_managed_path(text) {
                report.fields_already_migrated += 1;
                return value;
            }
            // Blank text carries no image; copied through as-is
            if text.trim().is_empty() {
                return value;
            }
        }

        let mut kind = "unrecognized";
        let extracted = BinaryPayload::from_value(value)
            .and_then(|payload| {
                kind = payload.kind();
                payload.normalize()
            })
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.writer.write_blob(&bytes));

        match extracted {
            Ok(path) => {
                report.files_written += 1;
                Value::Text(path)
            }
            Err(e) => {
                report.fields_nulled += 1;
                tracing::error!(
                    "✗ {}: could not extract {} payload in column '{}', storing NULL: {:#}",
                    label,
                    kind,
                    utils::sanitize_identifier(column),
                    e
                );
                Value::Null
            }
        }
    }

    fn remove_stale_staging(&self) -> Result<()> {
        let staging = &self.options.staging;
        if staging.exists() {
            tracing::warn!(
                "⚠ Removing staging database left by an earlier run: '{}'",
                staging.display()
            );
            fs::remove_file(staging).with_context(|| {
                format!("Failed to remove stale staging database '{}'", staging.display())
            })?;
        }
        Ok(())
    }

    fn discard_staging(&self) {
        for path in sqlite_files(&self.options.staging) {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed partial staging file '{}'", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(
                    "Error cleaning up staging file '{}': {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}

/// A database file plus its journal siblings
fn sqlite_files(path: &Path) -> Vec<PathBuf> {
    ["", "-journal", "-wal", "-shm"]
        .iter()
        .map(|suffix| {
            let mut name = path.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}
