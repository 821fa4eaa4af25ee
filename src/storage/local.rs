//! Filesystem object store
//!
//! Objects live at `root/<bucket>/<key>`. Writes go to a temporary sibling and
//! are renamed into place; conditional writes are serialized by one lock.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{check_condition, compute_etag, ObjectStore, PutCondition, StoredObject};
use crate::types::{LandscapeError, Result};

pub struct LocalStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || bucket.is_empty() || key.is_empty() {
            return Err(LandscapeError::Validation(format!(
                "Invalid object path: {}/{}",
                bucket, key
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn read_current(path: &Path) -> Result<Option<Bytes>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let path = self.object_path(bucket, key)?;
        match Self::read_current(&path).await? {
            Some(body) => {
                let etag = compute_etag(&body);
                Ok(StoredObject { body, etag })
            }
            None => Err(LandscapeError::NotFound(format!("{}/{}", bucket, key))),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
        condition: PutCondition,
    ) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        let _guard = self.write_lock.lock().await;

        if condition != PutCondition::None {
            let current = Self::read_current(&path).await?;
            let current_tag = current.as_deref().map(compute_etag);
            check_condition(&condition, current_tag.as_deref(), bucket, key)?;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(bucket, key, bytes = body.len(), "Wrote object to disk");
        Ok(compute_etag(&body))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
