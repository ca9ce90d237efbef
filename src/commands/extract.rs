// ABOUTME: Extract-blobs command: moves image blobs out of SQLite into upload files
// ABOUTME: Confirms with the operator, runs the extractor off the async runtime, reports totals

use crate::blob::FsBlobWriter;
use crate::config::MigrationConfig;
use crate::extract::{BlobExtractor, ExtractOptions, ExtractionReport};
use crate::interactive;
use anyhow::{bail, Context, Result};

/// Run the blob extractor against the configured database
///
/// Row and field failures are logged and counted in the returned report;
/// anything else aborts before the swap and leaves the source database as it
/// was.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use opgrants_migrator::{commands::extract_blobs, config::MigrationConfig};
/// # async fn example() -> Result<()> {
/// let config = MigrationConfig::default();
/// extract_blobs(&config, true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn extract_blobs(
    config: &MigrationConfig,
    skip_confirmation: bool,
) -> Result<ExtractionReport> {
    tracing::info!("Starting blob extraction...");

    let options = ExtractOptions::from_config(config);
    let writer = FsBlobWriter::from_config(&config.uploads);

    if !skip_confirmation && !interactive::confirm_extraction(&options, &writer.uploads_path())? {
        bail!("Extraction cancelled by user");
    }

    let extractor = BlobExtractor::new(options, writer);
    let report = tokio::task::spawn_blocking(move || extractor.run())
        .await
        .context("Extraction task panicked")??;

    log_summary(&report);

    Ok(report)
}

fn log_summary(report: &ExtractionReport) {
    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Extraction Summary");
    tracing::info!("========================================");
    tracing::info!("Rows read: {}", report.rows_read);
    tracing::info!("✓ Rows inserted: {}", report.rows_inserted);
    tracing::info!("✓ Files written: {}", report.files_written);
    if report.fields_already_migrated > 0 {
        tracing::info!("Paths kept from an earlier run: {}", report.fields_already_migrated);
    }
    if report.rows_skipped_empty > 0 {
        tracing::warn!("⚠ Empty rows skipped: {}", report.rows_skipped_empty);
    }
    if report.fields_nulled > 0 {
        tracing::warn!("⚠ Fields stored as NULL: {}", report.fields_nulled);
    }
    if report.rows_failed > 0 {
        tracing::error!("✗ Rows failed: {}", report.rows_failed);
    }
    if let Some(backup) = &report.backup_path {
        tracing::info!("Backup: {}", backup.display());
    }
    tracing::info!("========================================");
    tracing::info!("");

    if report.rows_failed > 0 || report.fields_nulled > 0 {
        tracing::warn!("⚠ Some data was not carried over; review the errors above");
    } else {
        tracing::info!("✅ Blob extraction complete");
    }
}
