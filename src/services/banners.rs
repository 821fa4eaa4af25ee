//! Site banners stored in `messages.json`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::{LandscapeError, Result};

pub const MESSAGES_KEY: &str = "messages.json";

fn default_kind() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// Mirrors `message` for older frontends
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub show: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BannerDocument {
    #[serde(default)]
    pub messages: Vec<Banner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Banner as submitted by an admin
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBanner {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub pages: Option<Vec<String>>,
    pub show: Option<bool>,
}

impl NewBanner {
    fn into_banner(self) -> Result<Banner> {
        let message = self
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| LandscapeError::Validation("Invalid banner data".into()))?;
        let pages = self
            .pages
            .filter(|p| !p.is_empty())
            .ok_or_else(|| LandscapeError::Validation("Invalid banner data".into()))?;

        Ok(Banner {
            title: self.title.unwrap_or_default(),
            description: message.clone(),
            message,
            kind: self.kind.filter(|k| !k.is_empty()).unwrap_or_else(default_kind),
            pages,
            show: self.show != Some(false),
            extra: Map::new(),
        })
    }
}

#[derive(Clone)]
pub struct BannerService {
    documents: DocumentGateway,
}

impl BannerService {
    pub fn new(documents: DocumentGateway) -> Self {
        Self { documents }
    }

    /// Every banner; an absent document reads as empty
    pub async fn all(&self) -> Result<BannerDocument> {
        match self.documents.get_json(BucketAlias::Main, MESSAGES_KEY).await {
            Ok(doc) => Ok(doc),
            Err(e) if e.is_not_found() => {
                info!("No {} found, returning no banners", MESSAGES_KEY);
                Ok(BannerDocument::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Banners currently switched on
    pub async fn active(&self) -> Result<BannerDocument> {
        let mut doc = self.all().await?;
        doc.messages.retain(|b| b.show);
        Ok(BannerDocument {
            messages: doc.messages,
            extra: Map::new(),
        })
    }

    /// Append a banner, creating the document if needed
    pub async fn add(&self, banner: NewBanner) -> Result<Banner> {
        let banner = banner.into_banner()?;
        let mut doc = self.all().await?;
        doc.messages.push(banner.clone());
        self.documents
            .put_json(BucketAlias::Main, MESSAGES_KEY, &doc)
            .await?;
        Ok(banner)
    }

    /// Set visibility of the banner at `index`; `None` flips it
    pub async fn toggle(&self, index: Option<i64>, show: Option<bool>) -> Result<bool> {
        let (mut doc, position) = self.load_for_index(index).await?;
        let banner = &mut doc.messages[position];
        banner.show = show.unwrap_or(!banner.show);
        let now_shown = banner.show;
        self.documents
            .put_json(BucketAlias::Main, MESSAGES_KEY, &doc)
            .await?;
        Ok(now_shown)
    }

    /// Remove the banner at `index`
    pub async fn delete(&self, index: Option<i64>) -> Result<Banner> {
        let (mut doc, position) = self.load_for_index(index).await?;
        let removed = doc.messages.remove(position);
        self.documents
            .put_json(BucketAlias::Main, MESSAGES_KEY, &doc)
            .await?;
        Ok(removed)
    }

    async fn load_for_index(&self, index: Option<i64>) -> Result<(BannerDocument, usize)> {
        let index = index.ok_or_else(|| LandscapeError::Validation("Invalid banner index".into()))?;

        let doc: BannerDocument = match self.documents.get_json(BucketAlias::Main, MESSAGES_KEY).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => {
                warn!("Banner edit requested but {} is missing", MESSAGES_KEY);
                return Err(LandscapeError::Validation("Messages file not found".into()));
            }
            Err(e) => return Err(e),
        };

        match usize::try_from(index) {
            Ok(position) if position < doc.messages.len() => Ok((doc, position)),
            _ => Err(LandscapeError::Validation("Banner index out of range".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Buckets, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    const MAIN: &str = "sdp-dev-digital-landscape";

    fn service() -> (Arc<MemoryStore>, BannerService) {
        let store = Arc::new(MemoryStore::new());
        let gateway = DocumentGateway::new(store.clone(), Buckets::default());
        (store, BannerService::new(gateway))
    }

    fn seed(store: &MemoryStore) {
        let doc = json!({"messages": [
            {"title": "A", "message": "first", "description": "first", "type": "info", "pages": ["radar"], "show": true},
            {"title": "B", "message": "second", "description": "second", "type": "warning", "pages": ["copilot"], "show": false}
        ]});
        store.insert(MAIN, MESSAGES_KEY, doc.to_string());
    }

    fn new_banner(message: &str, pages: Vec<&str>) -> NewBanner {
        NewBanner {
            message: Some(message.into()),
            pages: Some(pages.into_iter().map(String::from).collect()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_document_reads_empty() {
        let (_store, service) = service();
        assert!(service.all().await.unwrap().messages.is_empty());
        assert!(service.active().await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_active_filters_hidden() {
        let (store, service) = service();
        seed(&store);
        let active = service.active().await.unwrap();
        assert_eq!(active.messages.len(), 1);
        assert_eq!(active.messages[0].title, "A");
        assert_eq!(service.all().await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_add_applies_defaults() {
        let (_store, service) = service();
        let added = service.add(new_banner("hello", vec!["radar"])).await.unwrap();
        assert_eq!(added.description, "hello");
        assert_eq!(added.kind, "info");
        assert!(added.show);
        assert_eq!(added.title, "");
        assert_eq!(service.all().await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_missing_pages() {
        let (_store, service) = service();
        let err = service.add(new_banner("hello", vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid banner data");
        let err = service.add(NewBanner::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid banner data");
    }

    #[tokio::test]
    async fn test_toggle_and_delete() {
        let (store, service) = service();
        seed(&store);
        assert!(service.toggle(Some(1), Some(true)).await.unwrap());
        assert!(!service.toggle(Some(1), None).await.unwrap());

        let removed = service.delete(Some(0)).await.unwrap();
        assert_eq!(removed.title, "A");
        let remaining = service.all().await.unwrap();
        assert_eq!(remaining.messages.len(), 1);
        assert_eq!(remaining.messages[0].title, "B");
    }

    #[tokio::test]
    async fn test_index_errors() {
        let (store, service) = service();
        let err = service.delete(Some(0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Messages file not found");

        seed(&store);
        assert_eq!(
            service.delete(None).await.unwrap_err().to_string(),
            "Invalid banner index"
        );
        assert_eq!(
            service.delete(Some(2)).await.unwrap_err().to_string(),
            "Banner index out of range"
        );
        assert_eq!(
            service.toggle(Some(-1), Some(true)).await.unwrap_err().to_string(),
            "Banner index out of range"
        );
    }
}
