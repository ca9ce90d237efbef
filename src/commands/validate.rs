// ABOUTME: Pre-flight validation command for migration readiness
// ABOUTME: Checks the source schema, the uploads directory, and MongoDB connectivity

use crate::blob::{BlobWriter, FsBlobWriter};
use crate::config::MigrationConfig;
use crate::mongodb;
use crate::sqlite::{self, OPGRANTS_MANIFEST};
use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;

/// Check that both pipelines can run against the configured environment
///
/// Nothing is modified apart from creating the uploads directory when it is
/// missing. MongoDB is only contacted when `check_mongodb` is set.
pub async fn validate(config: &MigrationConfig, check_mongodb: bool) -> Result<()> {
    tracing::info!("Starting validation...");

    // Step 1: Source database and schema
    tracing::info!("Checking source database...");
    let path = config.sqlite.path.clone();
    let busy_timeout = config.sqlite.busy_timeout();
    let retry = config.retry.clone();
    let (row_count, binary_columns) = tokio::task::spawn_blocking(move || -> Result<(i64, usize)> {
        let conn = sqlite::open_read_only(&path, busy_timeout, &retry)?;
        let checked = sqlite::checked_columns(&conn, &OPGRANTS_MANIFEST).and_then(|columns| {
            let rows: i64 = conn
                .query_row(
                    &format!("SELECT count(*) FROM \"{}\"", OPGRANTS_MANIFEST.table),
                    [],
                    |row| row.get(0),
                )
                .context("Failed to count source rows")?;
            let file_columns = columns
                .iter()
                .filter(|c| sqlite::is_file_column(c))
                .count();
            Ok((rows, file_columns))
        });
        sqlite::close(conn, "source")?;
        checked
    })
    .await
    .context("Validation task panicked")??;
    tracing::info!(
        "✓ Schema matches manifest v{} ({} rows, {} file columns)",
        OPGRANTS_MANIFEST.version,
        row_count,
        binary_columns
    );

    // Step 2: Uploads directory
    tracing::info!("Checking uploads directory...");
    let writer = FsBlobWriter::from_config(&config.uploads);
    writer.prepare()?;
    let uploads = writer.uploads_path();
    NamedTempFile::new_in(&uploads)
        .with_context(|| format!("Uploads directory '{}' is not writable", uploads.display()))?;
    tracing::info!("✓ Uploads directory '{}' is writable", uploads.display());

    // Step 3: Staging location
    let staging = config.sqlite.staging_path();
    if staging.exists() {
        tracing::warn!(
            "⚠ Staging database '{}' exists and will be replaced by the next extraction",
            staging.display()
        );
    }

    // Step 4: MongoDB
    if check_mongodb {
        tracing::info!("Checking MongoDB...");
        let uri = config.mongodb.resolved_uri()?;
        let database =
            mongodb::resolve_database_name(&uri, config.mongodb.database.as_deref()).await?;
        let client = mongodb::connect_mongodb(&uri, config.mongodb.connect_timeout()).await?;
        client.shutdown().await;
        tracing::info!(
            "✓ MongoDB reachable; documents go to '{}.{}'",
            database,
            config.mongodb.collection
        );
    } else {
        tracing::info!("Skipping MongoDB check (pass --mongodb to include it)");
    }

    if config.run.captured_by.is_none() {
        tracing::warn!("⚠ [run].captured_by is not set; documents get a fresh capturedBy id");
    }

    if row_count == 0 {
        bail!("Source table '{}' is empty; nothing to migrate", OPGRANTS_MANIFEST.table);
    }

    tracing::info!("✅ Validation complete - ready for migration");
    Ok(())
}
