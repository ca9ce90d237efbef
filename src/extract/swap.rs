// ABOUTME: Final swap of the rebuilt database into the source path
// ABOUTME: Verified backup first, then one atomic rename so the canonical path is never empty

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// `<source>.backup-<unix-ms>`
pub fn backup_path_for(source: &Path, timestamp_ms: i64) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(format!(".backup-{}", timestamp_ms));
    PathBuf::from(name)
}

/// SHA-256 of a file's contents, hex encoded
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash '{}'", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Replace `source` with `staging`, keeping a verified timestamped backup
///
/// 1. Copy `source` to the backup path and fsync it
/// 2. Re-verify the backup exists and hashes identically to `source`
/// 3. Atomically rename `staging` over `source`
///
/// Until step 3 succeeds `source` is untouched. After it, `source` is the new
/// database; there is no moment where the canonical path holds neither.
pub fn finalize_swap(source: &Path, staging: &Path) -> Result<PathBuf> {
    if !staging.is_file() {
        bail!("Staging database '{}' does not exist", staging.display());
    }

    let backup = backup_path_for(source, chrono::Utc::now().timestamp_millis());
    if backup.exists() {
        bail!("Backup path '{}' already exists", backup.display());
    }

    tracing::info!("Backing up '{}' to '{}'", source.display(), backup.display());
    fs::copy(source, &backup).with_context(|| {
        format!(
            "Failed to copy '{}' to backup '{}'",
            source.display(),
            backup.display()
        )
    })?;
    File::open(&backup)
        .and_then(|f| f.sync_all())
        .with_context(|| format!("Failed to flush backup '{}'", backup.display()))?;

    verify_backup(source, &backup)?;

    fs::rename(staging, source).with_context(|| {
        format!(
            "Failed to move '{}' into place at '{}' (original is intact, backup at '{}')",
            staging.display(),
            source.display(),
            backup.display()
        )
    })?;

    sync_parent_dir(source);

    tracing::info!("✓ Swapped rebuilt database into '{}'", source.display());
    Ok(backup)
}

fn verify_backup(source: &Path, backup: &Path) -> Result<()> {
    if !backup.is_file() {
        bail!("Backup '{}' is missing after copy", backup.display());
    }

    let source_digest = file_digest(source)?;
    let backup_digest = file_digest(backup)?;
    if source_digest != backup_digest {
        bail!(
            "Backup '{}' does not match source (sha256 {} != {})",
            backup.display(),
            &backup_digest[..12],
            &source_digest[..12]
        );
    }

    tracing::info!("✓ Backup verified (sha256 {})", &source_digest[..12]);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        tracing::warn!("Could not fsync directory '{}': {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
