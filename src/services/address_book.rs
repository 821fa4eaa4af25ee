//! Username <-> email resolution
//!
//! Two lookup tables in the main bucket map GitHub usernames to ONS emails
//! and back. Identifiers containing `@` are treated as emails.

use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

use crate::storage::{BucketAlias, DocumentGateway};
use crate::types::{LandscapeError, Result};

pub const EMAIL_KEY: &str = "addressBookEmailKey.json";
pub const USERNAME_KEY: &str = "addressBookUsernameKey.json";

/// Resolved person; fields are null when the lookup misses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBookEntry {
    pub username: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
    pub fullname: Option<String>,
}

/// Split a `q` query value into trimmed, non-empty identifiers
pub fn parse_query(raw: Option<&str>) -> Result<Vec<String>> {
    let ids: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(LandscapeError::Validation("Missing input".into()));
    }
    Ok(ids)
}

/// `john.smith@ons.gov.uk` -> `john smith`
pub fn name_from_email(email: &str) -> String {
    let lower = email.to_lowercase();
    let local = lower.split('@').next().unwrap_or_default();
    local.split('.').take(2).collect::<Vec<_>>().join(" ")
}

/// Resolve each identifier against the two tables
pub fn resolve(
    ids: &[String],
    email_to_username: &HashMap<String, String>,
    username_to_email: &HashMap<String, String>,
) -> Vec<AddressBookEntry> {
    ids.iter()
        .map(|id| {
            let id = id.to_lowercase();
            let (username, email) = if id.contains('@') {
                (email_to_username.get(&id).cloned(), Some(id))
            } else {
                let email = username_to_email.get(&id).cloned();
                (Some(id), email)
            };
            AddressBookEntry {
                url: username.as_ref().map(|u| format!("https://github.com/{}", u)),
                fullname: email.as_deref().map(name_from_email),
                username,
                email,
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct AddressBookService {
    documents: DocumentGateway,
}

impl AddressBookService {
    pub fn new(documents: DocumentGateway) -> Self {
        Self { documents }
    }

    pub async fn lookup(&self, ids: &[String]) -> Result<Vec<AddressBookEntry>> {
        let (by_email, by_username) = tokio::try_join!(
            self.documents
                .get_json::<HashMap<String, String>>(BucketAlias::Main, EMAIL_KEY),
            self.documents
                .get_json::<HashMap<String, String>>(BucketAlias::Main, USERNAME_KEY),
        )
        .map_err(|e| {
            error!(error = %e, "Failed to load address book");
            e
        })?;
        Ok(resolve(ids, &by_email, &by_username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Buckets, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_parse_query() {
        assert_eq!(parse_query(Some(" alice , bob@ons.gov.uk,")).unwrap(), vec!["alice", "bob@ons.gov.uk"]);
        assert!(parse_query(Some(" , ")).is_err());
        assert_eq!(parse_query(None).unwrap_err().to_string(), "Missing input");
    }

    #[test]
    fn test_name_from_email() {
        assert_eq!(name_from_email("John.Smith@ons.gov.uk"), "john smith");
        assert_eq!(name_from_email("a.b.c@ons.gov.uk"), "a b");
        assert_eq!(name_from_email("solo@ons.gov.uk"), "solo");
    }

    #[tokio::test]
    async fn test_lookup_both_directions() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "sdp-dev-digital-landscape",
            EMAIL_KEY,
            json!({"jane.doe@ons.gov.uk": "janedoe"}).to_string(),
        );
        store.insert(
            "sdp-dev-digital-landscape",
            USERNAME_KEY,
            json!({"janedoe": "jane.doe@ons.gov.uk"}).to_string(),
        );
        let service = AddressBookService::new(DocumentGateway::new(store, Buckets::default()));

        let ids = vec!["JaneDoe".to_string(), "jane.doe@ons.gov.uk".to_string(), "ghost".to_string()];
        let out = service.lookup(&ids).await.unwrap();

        assert_eq!(out[0].email.as_deref(), Some("jane.doe@ons.gov.uk"));
        assert_eq!(out[0].url.as_deref(), Some("https://github.com/janedoe"));
        assert_eq!(out[1].username.as_deref(), Some("janedoe"));
        assert_eq!(out[1].fullname.as_deref(), Some("jane doe"));
        assert_eq!(out[2].email, None);
        assert_eq!(out[2].fullname, None);
    }
}
