// ABOUTME: Insertion of migrated documents into the opsgrants collection
// ABOUTME: DocumentSink seam, the MongoDB-backed sink, and the text search index

use crate::utils::Deadline;
use anyhow::{Context, Result};
use bson::{doc, Document};
use futures::future::BoxFuture;
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};

pub const SEARCH_INDEX_NAME: &str = "opsgrants_text_search";

/// Destination for migrated documents
pub trait DocumentSink {
    fn insert(&mut self, document: Document) -> BoxFuture<'_, Result<()>>;
}

/// Sink writing to a MongoDB collection, each call bounded by the run deadline
pub struct MongoSink {
    collection: Collection<Document>,
    deadline: Deadline,
}

impl MongoSink {
    pub fn new(collection: Collection<Document>, deadline: Deadline) -> Self {
        Self {
            collection,
            deadline,
        }
    }
}

impl DocumentSink for MongoSink {
    fn insert(&mut self, document: Document) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.deadline
                .run("document insert", async {
                    self.collection
                        .insert_one(document, None)
                        .await
                        .context("Failed to insert document")?;
                    Ok(())
                })
                .await
        })
    }
}

/// Create the full-text index used by the listing/search endpoints
///
/// Idempotent: MongoDB accepts re-creating an identical index.
pub async fn ensure_search_index(collection: &Collection<Document>) -> Result<String> {
    let index = IndexModel::builder()
        .keys(doc! {
            "businessLGA": "text",
            "businessName": "text",
            "status": "text",
            "phoneNumber": "text",
            "businessRegIssuer": "text",
        })
        .options(
            IndexOptions::builder()
                .name(SEARCH_INDEX_NAME.to_string())
                .build(),
        )
        .build();

    let created = collection
        .create_index(index, None)
        .await
        .with_context(|| {
            format!(
                "Failed to create text index on collection '{}'",
                collection.name()
            )
        })?;

    tracing::info!(
        "✓ Text search index '{}' ready on '{}'",
        created.index_name,
        collection.name()
    );
    Ok(created.index_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    #[ignore]
    async fn test_insert_and_index_against_live_server() {
        let url = std::env::var("TEST_MONGODB_URL")
            .expect("TEST_MONGODB_URL must be set for integration tests");
        let client = crate::mongodb::connect_mongodb(&url, Duration::from_secs(5))
            .await
            .unwrap();
        let collection = client
            .database("opgrants_migrator_test")
            .collection::<Document>("opsgrants");
        collection.drop(None).await.ok();

        assert_eq!(
            ensure_search_index(&collection).await.unwrap(),
            SEARCH_INDEX_NAME
        );

        let mut sink = MongoSink::new(collection.clone(), Deadline::unbounded());
        sink.insert(doc! { "firstName": "Ada" }).await.unwrap();
        assert_eq!(collection.count_documents(None, None).await.unwrap(), 1);

        collection.drop(None).await.unwrap();
        client.shutdown().await;
    }
}
