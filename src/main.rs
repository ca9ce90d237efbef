// ABOUTME: CLI entry point for opgrants-migrator
// ABOUTME: Parses commands, layers CLI overrides onto configuration, and routes to handlers

use anyhow::Context;
use clap::{Parser, Subcommand};
use opgrants_migrator::{commands, config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opgrants-migrator")]
#[command(about = "Move opgrants images out of SQLite and load the records into MongoDB", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to migration-config.toml
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the source schema, uploads directory, and optionally MongoDB
    Validate {
        /// SQLite database to check
        #[arg(long)]
        source: Option<PathBuf>,
        /// Also connect to MongoDB
        #[arg(long)]
        mongodb: bool,
        #[arg(long)]
        mongo_uri: Option<String>,
    },
    /// Write image blobs to upload files and swap in a rebuilt database
    ExtractBlobs {
        #[arg(long)]
        source: Option<PathBuf>,
        /// Where the rebuilt database is created before the swap
        #[arg(long)]
        staging: Option<PathBuf>,
        /// Directory the uploads path is relative to
        #[arg(long)]
        app_root: Option<PathBuf>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Load the extracted records into the opsgrants collection
    MigrateDocuments {
        #[arg(long)]
        source: Option<PathBuf>,
        /// MongoDB URL (defaults to [mongodb].uri or MONGODB_URI)
        #[arg(long)]
        mongo_uri: Option<String>,
        /// Database name when the URL does not carry one
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Check that every file column is NULL or an existing upload
    Verify {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        app_root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config_path {
        Some(path) => config::load_from_file(path)?,
        None => config::MigrationConfig::default(),
    };

    match cli.command {
        Commands::Validate {
            source,
            mongodb,
            mongo_uri,
        } => {
            if let Some(source) = source {
                config.sqlite.path = source;
            }
            if mongo_uri.is_some() {
                config.mongodb.uri = mongo_uri;
            }
            config.validate()?;
            commands::validate(&config, mongodb).await
        }
        Commands::ExtractBlobs {
            source,
            staging,
            app_root,
            yes,
        } => {
            if let Some(source) = source {
                config.sqlite.path = source;
            }
            if staging.is_some() {
                config.sqlite.staging_path = staging;
            }
            if let Some(app_root) = app_root {
                config.uploads.app_root = app_root;
            }
            config.validate()?;
            commands::extract_blobs(&config, yes).await.map(|_| ())
        }
        Commands::MigrateDocuments {
            source,
            mongo_uri,
            database,
            collection,
        } => {
            if let Some(source) = source {
                config.sqlite.path = source;
            }
            if mongo_uri.is_some() {
                config.mongodb.uri = mongo_uri;
            }
            if database.is_some() {
                config.mongodb.database = database;
            }
            if let Some(collection) = collection {
                config.mongodb.collection = collection;
            }
            config.validate()?;
            commands::migrate_documents(&config).await.map(|_| ())
        }
        Commands::Verify { source, app_root } => {
            if let Some(source) = source {
                config.sqlite.path = source;
            }
            if let Some(app_root) = app_root {
                config.uploads.app_root = app_root;
            }
            config.validate()?;
            commands::verify(&config).await.map(|_| ())
        }
    }
    .context("Command failed")
}
