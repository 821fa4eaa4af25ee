//! Tech radar persistence
//!
//! Wraps [`reconcile`] in a read-reconcile-write cycle against the object
//! store. Writes are conditional on the tag the document was read at; a
//! concurrent writer causes the whole cycle to be retried.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::model::RadarDocument;
use super::reconcile::reconcile;
use super::validate::ReconcileOptions;
use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::{LandscapeError, Result};

/// Object key of the radar document in the main bucket
pub const RADAR_KEY: &str = "onsRadarSkeleton.json";

/// What an update did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub entries_processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub total_entries: usize,
    /// Size of the written document in bytes
    pub document_bytes: usize,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct TechRadarService {
    documents: DocumentGateway,
    options: ReconcileOptions,
    write_attempts: u32,
}

impl TechRadarService {
    pub fn new(documents: DocumentGateway, options: ReconcileOptions, write_attempts: u32) -> Self {
        Self {
            documents,
            options,
            write_attempts: write_attempts.max(1),
        }
    }

    /// The stored document exactly as persisted
    pub async fn radar_json(&self) -> Result<Value> {
        self.documents.get_json(BucketAlias::Main, RADAR_KEY).await
    }

    /// Typed view of the stored document
    pub async fn document(&self) -> Result<RadarDocument> {
        self.documents.get_json(BucketAlias::Main, RADAR_KEY).await
    }

    /// Validate and merge `entries` into the stored document.
    ///
    /// `source` names the caller in logs (`admin`, `review`).
    pub async fn update_entries(&self, entries: Option<&Value>, source: &str) -> Result<UpdateOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self
                .documents
                .get_json_versioned::<RadarDocument>(BucketAlias::Main, RADAR_KEY)
                .await?;

            let (updated, summary) = reconcile(&current.value, entries, self.options)
                .map_err(|e| LandscapeError::Validation(e.to_string()))?;

            match self
                .documents
                .put_json_if_match(BucketAlias::Main, RADAR_KEY, &updated, &current.etag)
                .await
            {
                Ok(document_bytes) => {
                    info!(
                        source,
                        entries = summary.entries_processed,
                        inserted = summary.inserted,
                        updated = summary.updated,
                        total_entries = summary.total_entries,
                        bytes = document_bytes,
                        "Tech radar updated"
                    );
                    return Ok(UpdateOutcome {
                        entries_processed: summary.entries_processed,
                        inserted: summary.inserted,
                        updated: summary.updated,
                        total_entries: summary.total_entries,
                        document_bytes,
                        attempts: attempt,
                    });
                }
                Err(LandscapeError::Conflict(msg)) if attempt < self.write_attempts => {
                    warn!(source, attempt, "Radar changed during update, retrying: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Buckets, MemoryStore, ObjectStore, PutCondition, StoredObject};
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const MAIN: &str = "sdp-dev-digital-landscape";

    fn seeded() -> (Arc<MemoryStore>, TechRadarService) {
        let store = Arc::new(MemoryStore::new());
        let doc = json!({
            "quadrants": [{"id": "1", "name": "Languages"}, {"id": "2", "name": "Frameworks"}],
            "rings": [{"id": "adopt", "name": "ADOPT"}],
            "entries": []
        });
        store.insert(MAIN, RADAR_KEY, serde_json::to_vec_pretty(&doc).unwrap());
        let gateway = DocumentGateway::new(store.clone(), Buckets::default());
        (store, TechRadarService::new(gateway, ReconcileOptions::default(), 3))
    }

    fn entry(id: &str, quadrant: &str) -> Value {
        json!({
            "id": id,
            "title": id.to_uppercase(),
            "quadrant": quadrant,
            "timeline": [{"moved": 0, "ringId": "review", "date": "2024-05", "description": "Proposed"}]
        })
    }

    #[tokio::test]
    async fn test_update_persists_entry() {
        let (_store, service) = seeded();
        let outcome = service
            .update_entries(Some(&json!([entry("a", "1")])), "admin")
            .await
            .unwrap();
        assert_eq!(outcome.entries_processed, 1);
        assert_eq!(outcome.total_entries, 1);
        assert_eq!(outcome.attempts, 1);

        let doc = service.document().await.unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].id, "a");
    }

    #[tokio::test]
    async fn test_invalid_batch_leaves_store_untouched() {
        let (store, service) = seeded();
        let before = store.raw(MAIN, RADAR_KEY).unwrap();

        let err = service
            .update_entries(Some(&json!([entry("a", "99")])), "review")
            .await
            .unwrap_err();
        assert!(matches!(err, LandscapeError::Validation(_)));
        assert!(err.to_string().contains("Invalid"));
        assert_eq!(store.raw(MAIN, RADAR_KEY).unwrap(), before);
    }

    struct ConflictOnce {
        inner: MemoryStore,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for ConflictOnce {
        async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
            self.inner.get_object(bucket, key).await
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Bytes,
            content_type: &str,
            condition: PutCondition,
        ) -> Result<String> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(LandscapeError::Conflict("raced".into()));
            }
            self.inner.put_object(bucket, key, body, content_type, condition).await
        }

        fn name(&self) -> &'static str {
            "conflict-once"
        }
    }

    #[tokio::test]
    async fn test_conflict_retries_cycle() {
        let inner = MemoryStore::new();
        inner.insert(
            MAIN,
            RADAR_KEY,
            r#"{"quadrants":[{"id":"1","name":"L"}],"rings":[],"entries":[]}"#,
        );
        let store = Arc::new(ConflictOnce {
            inner,
            tripped: AtomicBool::new(false),
        });
        let service = TechRadarService::new(
            DocumentGateway::new(store, Buckets::default()),
            ReconcileOptions::default(),
            3,
        );
        let outcome = service
            .update_entries(Some(&json!([entry("a", "1")])), "admin")
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_missing_document_surfaces_not_found() {
        let store = Arc::new(MemoryStore::new());
        let gateway = DocumentGateway::new(store, Buckets::default());
        let service = TechRadarService::new(gateway, ReconcileOptions::default(), 3);
        let err = service
            .update_entries(Some(&json!([entry("a", "1")])), "admin")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
