// ABOUTME: Migrate-documents command: loads path-referencing rows into MongoDB
// ABOUTME: Builds options from configuration and reports inserted and skipped records

use crate::config::MigrationConfig;
use crate::migrate::{self, MigrateOptions, MigrationReport};
use anyhow::Result;

pub async fn migrate_documents(config: &MigrationConfig) -> Result<MigrationReport> {
    tracing::info!("Starting document migration...");

    let options = MigrateOptions::from_config(config)?;
    let report = migrate::migrate_documents(&options).await?;

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Migration Summary");
    tracing::info!("========================================");
    tracing::info!("Rows read: {}", report.rows_read);
    tracing::info!("✓ Documents inserted: {}", report.inserted);
    tracing::info!("⚠ Records rejected: {}", report.rejected);
    tracing::info!("✗ Inserts failed: {}", report.failed_inserts);
    tracing::info!("========================================");
    tracing::info!("");

    if report.skipped() > 0 {
        tracing::warn!(
            "⚠ {} record(s) were not migrated; review the warnings above",
            report.skipped()
        );
    } else {
        tracing::info!("✅ Document migration complete");
    }

    Ok(report)
}
