// ABOUTME: TOML configuration for both migration pipelines
// ABOUTME: Loads the optional config file and applies CLI and environment overrides

use crate::utils::RetryPolicy;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_UPLOADS_DIR: &str = "uploads";
pub const DEFAULT_EXTENSION: &str = "jpg";
pub const DEFAULT_COLLECTION: &str = "opsgrants";
pub const MONGODB_URI_ENV: &str = "MONGODB_URI";

/// Complete configuration, usually from `migration-config.toml`
///
/// ```toml
/// [sqlite]
/// path = "db/kaddep.db"
///
/// [uploads]
/// app_root = "."
///
/// [mongodb]
/// uri = "mongodb://localhost:27017/kaddep"
///
/// [retry]
/// max_retries = 3
/// initial_delay_ms = 1000
///
/// [run]
/// deadline_secs = 3600
///
/// [wards]
/// "Kaduna North" = ["Gabasawa", "Hayin Banki"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    pub sqlite: SqliteConfig,
    pub uploads: UploadsConfig,
    pub mongodb: MongoConfig,
    pub retry: RetryPolicy,
    pub run: RunConfig,
    /// LGA name -> wards of that LGA. Empty disables LGA/ward checks.
    pub wards: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    pub path: PathBuf,
    /// Where the replacement database is built; defaults to `<stem>_new.<ext>`
    pub staging_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db/kaddep.db"),
            staging_path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    pub fn staging_path(&self) -> PathBuf {
        if let Some(path) = &self.staging_path {
            return path.clone();
        }

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let name = match self.path.extension() {
            Some(ext) => format!("{}_new.{}", stem, ext.to_string_lossy()),
            None => format!("{}_new", stem),
        };
        self.path.with_file_name(name)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Root that stored relative paths resolve against
    pub app_root: PathBuf,
    /// Upload directory name relative to `app_root`
    pub dir: String,
    pub extension: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("."),
            dir: DEFAULT_UPLOADS_DIR.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MongoConfig {
    pub uri: Option<String>,
    /// Defaults to the database named in the URI
    pub database: Option<String>,
    pub collection: String,
    pub connect_timeout_secs: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database: None,
            collection: DEFAULT_COLLECTION.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl MongoConfig {
    /// URI from config, falling back to `MONGODB_URI`
    pub fn resolved_uri(&self) -> Result<String> {
        if let Some(uri) = &self.uri {
            return Ok(uri.clone());
        }
        std::env::var(MONGODB_URI_ENV).with_context(|| {
            format!(
                "No MongoDB URI configured: pass --mongo-uri, set [mongodb].uri, or export {}",
                MONGODB_URI_ENV
            )
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub deadline_secs: Option<u64>,
    /// Hex ObjectId of the operator credited as `capturedBy`
    pub captured_by: Option<String>,
}

impl RunConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path) -> Result<MigrationConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
}

pub fn parse(raw: &str) -> Result<MigrationConfig> {
    let config: MigrationConfig = toml::from_str(raw).context("Failed to parse TOML")?;
    config.validate()?;
    Ok(config)
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.uploads.dir.trim().is_empty() || Path::new(&self.uploads.dir).is_absolute() {
            bail!(
                "[uploads].dir must be a non-empty path relative to app_root, got '{}'",
                self.uploads.dir
            );
        }
        if self.uploads.extension.is_empty() || self.uploads.extension.contains('.') {
            bail!(
                "[uploads].extension must be a bare extension such as 'jpg', got '{}'",
                self.uploads.extension
            );
        }
        if self.sqlite.staging_path() == self.sqlite.path {
            bail!("[sqlite].staging_path must differ from [sqlite].path");
        }
        if self.mongodb.collection.trim().is_empty() {
            bail!("[mongodb].collection cannot be empty");
        }
        if let Some(id) = &self.run.captured_by {
            bson::oid::ObjectId::parse_str(id)
                .with_context(|| format!("[run].captured_by '{}' is not a valid ObjectId", id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_layout() {
        let config = MigrationConfig::default();
        assert_eq!(config.sqlite.path, PathBuf::from("db/kaddep.db"));
        assert_eq!(
            config.sqlite.staging_path(),
            PathBuf::from("db/kaddep_new.db")
        );
        assert_eq!(config.uploads.dir, "uploads");
        assert_eq!(config.mongodb.collection, "opsgrants");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let config = parse(
            r#"
            [sqlite]
            path = "/data/kaddep.db"
            busy_timeout_ms = 250

            [uploads]
            app_root = "/srv/api"

            [mongodb]
            uri = "mongodb://localhost:27017/kaddep"
            collection = "grants"

            [retry]
            max_retries = 5

            [run]
            deadline_secs = 60
            captured_by = "65a1f0c2e4b0a1b2c3d4e5f6"

            [wards]
            "Kaduna North" = ["Gabasawa", "Hayin Banki"]
            "#,
        )
        .unwrap();

        assert_eq!(config.sqlite.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.uploads.app_root, PathBuf::from("/srv/api"));
        assert_eq!(config.mongodb.collection, "grants");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.run.deadline(), Some(Duration::from_secs(60)));
        assert_eq!(config.wards["Kaduna North"].len(), 2);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(parse("[sqlite]\npaht = \"x.db\"").is_err());
    }

    #[test]
    fn test_rejects_bad_captured_by() {
        let err = parse("[run]\ncaptured_by = \"operator-1\"").unwrap_err();
        assert!(format!("{:#}", err).contains("ObjectId"));
    }

    #[test]
    fn test_rejects_staging_equal_to_source() {
        let err = parse("[sqlite]\npath = \"a.db\"\nstaging_path = \"a.db\"").unwrap_err();
        assert!(format!("{:#}", err).contains("staging_path"));
    }

    #[test]
    fn test_rejects_absolute_uploads_dir() {
        assert!(parse("[uploads]\ndir = \"/tmp/uploads\"").is_err());
    }

    #[test]
    fn test_explicit_uri_wins() {
        let mongo = MongoConfig {
            uri: Some("mongodb://db:27017/x".to_string()),
            ..MongoConfig::default()
        };
        assert_eq!(mongo.resolved_uri().unwrap(), "mongodb://db:27017/x");
    }
}
