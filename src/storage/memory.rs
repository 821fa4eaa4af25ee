//! In-memory object store

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{check_condition, compute_etag, ObjectStore, PutCondition, StoredObject};
use crate::types::{LandscapeError, Result};

/// Objects held in a concurrent map keyed by `(bucket, key)`
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<(String, String), StoredObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly (fixtures, dev mode)
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        let body = body.into();
        let etag = compute_etag(&body);
        self.objects
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, etag });
    }

    /// Raw bytes currently stored, if any
    pub fn raw(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.clone())
            .ok_or_else(|| LandscapeError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
        condition: PutCondition,
    ) -> Result<String> {
        let id = (bucket.to_string(), key.to_string());
        // The entry guard holds the shard lock across check and write
        let entry = self.objects.entry(id);
        let current = match &entry {
            Entry::Occupied(o) => Some(o.get().etag.clone()),
            Entry::Vacant(_) => None,
        };
        check_condition(&condition, current.as_deref(), bucket, key)?;

        let etag = compute_etag(&body);
        entry.insert(StoredObject {
            body,
            etag: etag.clone(),
        });
        Ok(etag)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
