//! Object storage
//!
//! Whole-document storage addressed by bucket and key. Backends implement
//! [`ObjectStore`]; [`DocumentGateway`] layers bucket aliases and the JSON
//! codec on top of whichever backend is configured.

pub mod gateway;
pub mod local;
pub mod memory;
pub mod s3;

pub use gateway::{BucketAlias, Buckets, DocumentGateway, Versioned};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::{RetryPolicy, S3Store};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::types::Result;

/// Object body plus the version tag it was read at
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub etag: String,
}

/// Precondition attached to a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional overwrite
    None,
    /// Only write if the current version still has this tag
    IfMatch(String),
    /// Only write if the object does not exist yet
    IfNoneMatch,
}

/// Whole-object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `LandscapeError::NotFound` when missing
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject>;

    /// Write an object, returning its new tag; `LandscapeError::Conflict`
    /// when the condition does not hold
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Content hash used as the version tag by the in-process backends
pub fn compute_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();
    format!("\"{}\"", hex::encode(&hash[..16]))
}

/// Check a write condition against the current tag (`None` when absent)
pub(crate) fn check_condition(
    condition: &PutCondition,
    current: Option<&str>,
    bucket: &str,
    key: &str,
) -> Result<()> {
    use crate::types::LandscapeError;

    match (condition, current) {
        (PutCondition::None, _) => Ok(()),
        (PutCondition::IfMatch(expected), Some(tag)) if expected == tag => Ok(()),
        (PutCondition::IfMatch(_), _) => Err(LandscapeError::Conflict(format!(
            "{}/{} changed since it was read",
            bucket, key
        ))),
        (PutCondition::IfNoneMatch, None) => Ok(()),
        (PutCondition::IfNoneMatch, Some(_)) => Err(LandscapeError::Conflict(format!(
            "{}/{} already exists",
            bucket, key
        ))),
    }
}
