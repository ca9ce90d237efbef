// ABOUTME: Terminal confirmation before the destructive blob extraction
// ABOUTME: Summarizes which files will be rewritten and asks the operator to proceed

use crate::extract::ExtractOptions;
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::Path;

/// Show what the extraction will touch and ask for confirmation
///
/// Returns `Ok(false)` when the operator declines.
pub fn confirm_extraction(options: &ExtractOptions, uploads_dir: &Path) -> Result<bool> {
    println!();
    println!("========================================");
    println!("Blob extraction plan");
    println!("========================================");
    println!("  Source database:  {}", options.source.display());
    println!("  Staging database: {}", options.staging.display());
    println!("  Image files in:   {}", uploads_dir.display());
    println!();
    println!("The source database will be replaced by the rebuilt copy.");
    println!("A timestamped backup is kept next to it.");
    println!("========================================");
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with extraction?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
    }

    Ok(confirmed)
}
