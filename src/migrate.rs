// ABOUTME: Schema migration from path-referencing SQLite rows to MongoDB documents
// ABOUTME: Reads every opgrants row, reshapes it, and inserts one document per valid record

use crate::config::MigrationConfig;
use crate::mongodb::{self, DocumentSink, MongoSink};
use crate::sqlite::{self, SourceRow, OPGRANTS_MANIFEST};
use crate::transform::{self, SourceRecord, TransformOptions};
use crate::utils::{self, Deadline, RetryPolicy};
use anyhow::{Context, Result};
use bson::oid::ObjectId;
use bson::Document;
use std::path::PathBuf;
use std::time::Duration;

/// Where and how the schema migrator runs
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub source: PathBuf,
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
    pub deadline: Option<Duration>,
    pub mongo_uri: String,
    pub database: Option<String>,
    pub collection: String,
    pub connect_timeout: Duration,
    pub transform: TransformOptions,
}

impl MigrateOptions {
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let captured_by = config
            .run
            .captured_by
            .as_deref()
            .map(ObjectId::parse_str)
            .transpose()
            .context("[run].captured_by is not a valid ObjectId")?;

        Ok(Self {
            source: config.sqlite.path.clone(),
            busy_timeout: config.sqlite.busy_timeout(),
            retry: config.retry.clone(),
            deadline: config.run.deadline(),
            mongo_uri: config.mongodb.resolved_uri()?,
            database: config.mongodb.database.clone(),
            collection: config.mongodb.collection.clone(),
            connect_timeout: config.mongodb.connect_timeout(),
            transform: TransformOptions {
                captured_by,
                wards: config.wards.clone(),
            },
        })
    }
}

/// Counters for one migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub rows_read: usize,
    pub inserted: usize,
    /// Records that failed validation or reshaping
    pub rejected: usize,
    pub failed_inserts: usize,
}

impl MigrationReport {
    pub fn skipped(&self) -> usize {
        self.rejected + self.failed_inserts
    }
}

/// Transform and insert each row, one at a time
///
/// A record that cannot be reshaped, or whose insert fails, is logged and
/// skipped. Only a passed deadline stops the loop.
pub async fn migrate_records<S: DocumentSink>(
    rows: Vec<SourceRow>,
    sink: &mut S,
    options: &TransformOptions,
    deadline: &Deadline,
) -> Result<MigrationReport> {
    let mut report = MigrationReport {
        rows_read: rows.len(),
        ..MigrationReport::default()
    };

    if options.captured_by.is_none() && !rows.is_empty() {
        tracing::warn!(
            "⚠ No [run].captured_by operator configured; each document gets a fresh capturedBy id"
        );
    }

    let progress = utils::progress_bar(rows.len() as u64)?;

    for (ordinal, row) in rows.into_iter().enumerate() {
        deadline.check()?;
        progress.inc(1);

        let label = row.label(ordinal);
        let record = SourceRecord::from(row);

        let transformed = transform::transform_record(&record, options)
            .map_err(anyhow::Error::from)
            .and_then(|doc| Ok((doc.summary(), doc.to_document()?)));

        let (summary, document): (String, Document) = match transformed {
            Ok(pair) => pair,
            Err(e) => {
                report.rejected += 1;
                tracing::warn!("⚠ Skipping {} [{}]: {:#}", label, record.summary(), e);
                continue;
            }
        };

        match sink.insert(document).await {
            Ok(()) => {
                report.inserted += 1;
                tracing::debug!("Inserted {} [{}]", label, summary);
            }
            Err(e) => {
                report.failed_inserts += 1;
                tracing::error!("✗ Failed to insert {} [{}]: {:#}", label, summary, e);
            }
        }
    }

    progress.finish_with_message("Migration complete");

    Ok(report)
}

/// Full run: connect, read SQLite, index, migrate, release both connections
pub async fn migrate_documents(options: &MigrateOptions) -> Result<MigrationReport> {
    let deadline = Deadline::after(options.deadline);

    tracing::info!("Step 1/4: Connecting to MongoDB...");
    let client = deadline
        .run(
            "MongoDB connection",
            mongodb::connect_with_retry(&options.mongo_uri, &options.retry, options.connect_timeout),
        )
        .await?;

    let result = run_with_client(&client, options, &deadline).await;

    client.shutdown().await;
    tracing::debug!("Closed MongoDB client");

    result
}

async fn run_with_client(
    client: &::mongodb::Client,
    options: &MigrateOptions,
    deadline: &Deadline,
) -> Result<MigrationReport> {
    tracing::info!("Step 2/4: Reading source rows...");
    let source = options.source.clone();
    let busy_timeout = options.busy_timeout;
    let retry = options.retry.clone();

    let rows = tokio::task::spawn_blocking(move || -> Result<Vec<SourceRow>> {
        let conn = sqlite::open_read_only(&source, busy_timeout, &retry)?;
        let read = sqlite::checked_columns(&conn, &OPGRANTS_MANIFEST)
            .and_then(|columns| sqlite::read_rows(&conn, OPGRANTS_MANIFEST.table, &columns));
        sqlite::close(conn, "source")?;
        read
    })
    .await
    .context("SQLite reader task panicked")??;

    tracing::info!("Step 3/4: Preparing collection...");
    let database_name =
        mongodb::resolve_database_name(&options.mongo_uri, options.database.as_deref()).await?;
    let collection = client
        .database(&database_name)
        .collection::<Document>(&options.collection);

    deadline
        .run("search index creation", mongodb::ensure_search_index(&collection))
        .await?;

    tracing::info!(
        "Step 4/4: Migrating {} rows into '{}.{}'...",
        rows.len(),
        database_name,
        options.collection
    );
    let mut sink = MongoSink::new(collection, *deadline);
    migrate_records(rows, &mut sink, &options.transform, deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use rusqlite::types::Value;

    #[derive(Default)]
    struct MemorySink {
        documents: Vec<Document>,
        fail_on: Option<String>,
    }

    impl DocumentSink for MemorySink {
        fn insert(&mut self, document: Document) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(name) = &self.fail_on {
                    if document.get_str("firstName").ok() == Some(name.as_str()) {
                        anyhow::bail!("duplicate key");
                    }
                }
                self.documents.push(document);
                Ok(())
            })
        }
    }

    fn row(id: i64, first_name: &str, items: Option<&str>) -> SourceRow {
        let mut fields = vec![
            ("id", Value::Integer(id)),
            ("firstName", Value::Text(first_name.into())),
            ("lastName", Value::Text("Bello".into())),
            ("dob", Value::Text("1985-01-30".into())),
            ("gender", Value::Text("M".into())),
            ("phone", Value::Text(format!("0803000000{}", id))),
            ("homeAddress", Value::Text("Tudun Wada".into())),
            ("civilServant", Value::Integer(1)),
            ("bvn", Value::Text("11111111111".into())),
            ("ownerPassportPhotoUrl", Value::Text("uploads/p.jpg".into())),
            ("idDocType", Value::Text("Voter Card".into())),
            ("idDocPhotoUrl", Value::Text("uploads/i.jpg".into())),
            ("businessName", Value::Text("Bello Tailoring".into())),
            ("businessAddress", Value::Text("Kawo".into())),
            ("businessLGA", Value::Text("Kaduna North".into())),
            ("businessLGACode", Value::Text("KDN".into())),
            ("businessWard", Value::Text("Kawo".into())),
            ("ownerAtBusinessPhotoUrl", Value::Text("uploads/o.jpg".into())),
            ("latitude", Value::Real(10.5)),
            ("longitude", Value::Real(7.4)),
            ("businessRegCat", Value::Null),
            ("catType", Value::Text("Unregistered".into())),
            ("certPhotoUrl", Value::Text("uploads/c.jpg".into())),
            ("businessRegIssuer", Value::Text("Cooperative".into())),
            ("businessRegNum", Value::Text("COOP-9".into())),
            ("yearsInOperation", Value::Integer(2)),
            ("numStaff", Value::Integer(1)),
            ("costOfItems", Value::Integer(5000)),
            ("bank", Value::Text("GTBank".into())),
            ("accountNumber", Value::Text("0011223344".into())),
        ];
        if let Some(items) = items {
            fields.push(("itemsPurchased", Value::Text(items.into())));
        }
        SourceRow::new(
            fields
                .into_iter()
                .map(|(c, v)| (c.to_string(), v))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_invalid_records_are_skipped_not_fatal() {
        let rows = vec![
            row(1, "Musa", Some(r#"[{"itemsList":"machine","receiptPhotoUrl":"uploads/r.jpg"}]"#)),
            row(2, "Sani", Some("{not json")),
            row(3, "Hauwa", None),
        ];
        let mut sink = MemorySink::default();

        let report = migrate_records(rows, &mut sink, &TransformOptions::default(), &Deadline::unbounded())
            .await
            .unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(sink.documents.len(), 2);
        assert_eq!(sink.documents[0].get_str("firstName").unwrap(), "Musa");
        assert!(sink.documents[1].get_array("itemsPurchased").unwrap().is_empty());
        assert!(sink.documents[1].get_bool("isCivilServant").unwrap());
    }

    #[tokio::test]
    async fn test_insert_failure_is_counted_and_run_continues() {
        let rows = vec![row(1, "Musa", None), row(2, "Sani", None), row(3, "Hauwa", None)];
        let mut sink = MemorySink {
            fail_on: Some("Sani".to_string()),
            ..MemorySink::default()
        };

        let report = migrate_records(rows, &mut sink, &TransformOptions::default(), &Deadline::unbounded())
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed_inserts, 1);
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn test_passed_deadline_stops_the_loop() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        let mut sink = MemorySink::default();

        let result = migrate_records(
            vec![row(1, "Musa", None)],
            &mut sink,
            &TransformOptions::default(),
            &deadline,
        )
        .await;

        assert!(result.is_err());
        assert!(sink.documents.is_empty());
    }

    #[test]
    fn test_options_from_config() {
        let config = crate::config::parse(
            r#"
            [mongodb]
            uri = "mongodb://localhost:27017/kaddep"
            collection = "grants"

            [run]
            captured_by = "65a1f0c2e4b0a1b2c3d4e5f6"
            "#,
        )
        .unwrap();

        let options = MigrateOptions::from_config(&config).unwrap();
        assert_eq!(options.collection, "grants");
        assert_eq!(options.mongo_uri, "mongodb://localhost:27017/kaddep");
        assert_eq!(
            options.transform.captured_by.unwrap().to_hex(),
            "65a1f0c2e4b0a1b2c3d4e5f6"
        );
    }
}
