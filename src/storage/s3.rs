//! S3-compatible object store over HTTP
//!
//! Path-style addressing (`{endpoint}/{bucket}/{key}`) with an optional bearer
//! token. Conditional writes use `If-Match` / `If-None-Match`; a 412 answer
//! becomes `LandscapeError::Conflict`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::{compute_etag, ObjectStore, PutCondition, StoredObject};
use crate::types::{LandscapeError, Result};

/// Retry budget for reads
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff, doubling per attempt
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(6) as u32;
        self.base_delay * factor
    }
}

pub struct S3Store {
    endpoint: String,
    bearer_token: Option<String>,
    retry: RetryPolicy,
    client: Client,
}

impl S3Store {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("landscape/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bearer_token: None,
            retry: RetryPolicy::default(),
            client,
        }
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = key
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let url = self.object_url(bucket, key);
        let mut attempt = 0usize;

        loop {
            let outcome = self.authorize(self.client.get(&url)).send().await;
            let retry_reason = match outcome {
                Ok(resp) if resp.status().is_success() => {
                    let etag = resp
                        .headers()
                        .get(header::ETAG)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = resp.bytes().await?;
                    let etag = etag.unwrap_or_else(|| compute_etag(&body));
                    debug!(bucket, key, bytes = body.len(), "Fetched object");
                    return Ok(StoredObject { body, etag });
                }
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(LandscapeError::NotFound(format!("{}/{}", bucket, key)));
                }
                Ok(resp) if resp.status().is_server_error() => {
                    format!("status {}", resp.status())
                }
                Ok(resp) => {
                    return Err(LandscapeError::Storage(format!(
                        "GET {}/{} failed: {}",
                        bucket,
                        key,
                        resp.status()
                    )));
                }
                Err(e) => e.to_string(),
            };

            attempt += 1;
            if attempt >= self.retry.max_attempts {
                return Err(LandscapeError::Storage(format!(
                    "GET {}/{} failed after {} attempts: {}",
                    bucket, key, attempt, retry_reason
                )));
            }
            warn!(bucket, key, attempt, reason = %retry_reason, "Retrying object read");
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<String> {
        let len = body.len();
        let fallback_etag = compute_etag(&body);
        let mut req = self
            .client
            .put(self.object_url(bucket, key))
            .header(header::CONTENT_TYPE, content_type)
            .body(body);
        req = match condition {
            PutCondition::None => req,
            PutCondition::IfMatch(etag) => req.header(header::IF_MATCH, etag),
            PutCondition::IfNoneMatch => req.header(header::IF_NONE_MATCH, "*"),
        };

        let resp = self.authorize(req).send().await?;
        match resp.status() {
            s if s.is_success() => {
                let etag = resp
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .unwrap_or(fallback_etag);
                debug!(bucket, key, bytes = len, "Stored object");
                Ok(etag)
            }
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(
                LandscapeError::Conflict(format!("{}/{} changed since it was read", bucket, key)),
            ),
            s => Err(LandscapeError::Storage(format!(
                "PUT {}/{} failed: {}",
                bucket, key, s
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_path_style() {
        let store = S3Store::new("https://s3.example.com/", Duration::from_secs(1));
        assert_eq!(
            store.object_url("bucket", "/dir/file name.json"),
            "https://s3.example.com/bucket/dir/file%20name.json"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_empty_token_ignored() {
        let store = S3Store::new("http://x", Duration::from_secs(1)).with_bearer_token(Some(String::new()));
        assert!(store.bearer_token.is_none());
    }
}
