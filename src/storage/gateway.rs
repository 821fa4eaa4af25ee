//! JSON document gateway
//!
//! Resolves bucket aliases to configured bucket names and (de)serializes whole
//! documents. Documents are written pretty-printed with two-space indent.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use super::{ObjectStore, PutCondition};
use crate::config::StorageArgs;
use crate::types::{LandscapeError, Result};

/// Logical bucket names used by the routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketAlias {
    /// Radar, repositories, banners, address book
    Main,
    /// Tech audit tool project data
    Tat,
    /// Copilot usage data
    Copilot,
}

impl fmt::Display for BucketAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Tat => write!(f, "tat"),
            Self::Copilot => write!(f, "copilot"),
        }
    }
}

/// Alias to bucket-name mapping
#[derive(Debug, Clone)]
pub struct Buckets {
    pub main: String,
    pub tat: String,
    pub copilot: String,
}

impl Buckets {
    pub fn resolve(&self, alias: BucketAlias) -> &str {
        match alias {
            BucketAlias::Main => &self.main,
            BucketAlias::Tat => &self.tat,
            BucketAlias::Copilot => &self.copilot,
        }
    }
}

impl From<&StorageArgs> for Buckets {
    fn from(args: &StorageArgs) -> Self {
        Self {
            main: args.bucket_name.clone(),
            tat: args.tat_bucket_name.clone(),
            copilot: args.copilot_bucket_name.clone(),
        }
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            main: "sdp-dev-digital-landscape".into(),
            tat: "sdp-dev-tech-audit-tool-api".into(),
            copilot: "sdp-dev-copilot-usage-dashboard".into(),
        }
    }
}

/// A decoded document together with the tag it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub etag: String,
}

#[derive(Clone)]
pub struct DocumentGateway {
    store: Arc<dyn ObjectStore>,
    buckets: Buckets,
}

impl DocumentGateway {
    pub fn new(store: Arc<dyn ObjectStore>, buckets: Buckets) -> Self {
        Self { store, buckets }
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Read and decode a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, alias: BucketAlias, key: &str) -> Result<T> {
        Ok(self.get_json_versioned(alias, key).await?.value)
    }

    /// Read and decode a JSON document along with its version tag
    pub async fn get_json_versioned<T: DeserializeOwned>(
        &self,
        alias: BucketAlias,
        key: &str,
    ) -> Result<Versioned<T>> {
        let bucket = self.buckets.resolve(alias);
        let object = self.store.get_object(bucket, key).await.map_err(|e| {
            if !e.is_not_found() {
                error!(bucket, key, error = %e, "Failed to read object");
            }
            e
        })?;
        let value = serde_json::from_slice(&object.body).map_err(|e| {
            error!(bucket, key, error = %e, "Stored object is not valid JSON");
            LandscapeError::Storage(format!("{}/{} is not valid JSON: {}", bucket, key, e))
        })?;
        debug!(bucket, key, bytes = object.body.len(), "Read JSON document");
        Ok(Versioned {
            value,
            etag: object.etag,
        })
    }

    /// Serialize and write a JSON document unconditionally
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        alias: BucketAlias,
        key: &str,
        value: &T,
    ) -> Result<usize> {
        self.put_json_with(alias, key, value, PutCondition::None).await
    }

    /// Serialize and write a JSON document only if it still has `etag`
    pub async fn put_json_if_match<T: Serialize + ?Sized>(
        &self,
        alias: BucketAlias,
        key: &str,
        value: &T,
        etag: &str,
    ) -> Result<usize> {
        self.put_json_with(alias, key, value, PutCondition::IfMatch(etag.to_string()))
            .await
    }

    async fn put_json_with<T: Serialize + ?Sized>(
        &self,
        alias: BucketAlias,
        key: &str,
        value: &T,
        condition: PutCondition,
    ) -> Result<usize> {
        let bucket = self.buckets.resolve(alias);
        let body = serde_json::to_vec_pretty(value)?;
        let len = body.len();
        self.store
            .put_object(bucket, key, Bytes::from(body), "application/json", condition)
            .await
            .map_err(|e| {
                if !matches!(e, LandscapeError::Conflict(_)) {
                    error!(bucket, key, error = %e, "Failed to write object");
                }
                e
            })?;
        debug!(bucket, key, bytes = len, "Wrote JSON document");
        Ok(len)
    }
}
