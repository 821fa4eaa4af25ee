//! Reviewer routes under `/review/api`
//!
//! Failures carry a `type` discriminator and a `suggestion` alongside the
//! error message so the review UI can explain what to do next.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::{authorize, json_response, method_not_allowed, not_found_response, ApiRequest};
use crate::auth::{Identity, Role};
use crate::logging::{AuditAction, AuditEvent};
use crate::server::AppState;
use crate::types::LandscapeError;

pub const PREFIX: &str = "/review/api";

#[derive(Debug, Serialize)]
pub struct ReviewError {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub suggestion: &'static str,
}

fn suggestion(err: &LandscapeError) -> &'static str {
    match err {
        LandscapeError::Validation(_) => {
            "Check that every entry has an id, a title, a known quadrant and a well-formed timeline"
        }
        LandscapeError::PayloadTooLarge(_) => "Submit fewer entries per request",
        LandscapeError::NotFound(_) => "The tech radar document is missing, contact an administrator",
        LandscapeError::Conflict(_) => "The tech radar changed while saving, retry the update",
        _ => "Try again later and contact an administrator if the problem persists",
    }
}

/// Review-shaped error response
pub fn review_error(err: &LandscapeError) -> Response<Full<Bytes>> {
    let status = match err {
        LandscapeError::Validation(_) => StatusCode::BAD_REQUEST,
        LandscapeError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(kind = err.kind(), "Review update failed: {}", err);
    } else {
        warn!(kind = err.kind(), "Review update rejected: {}", err);
    }
    json_response(
        status,
        &ReviewError {
            error: err.to_string(),
            kind: err.kind(),
            suggestion: suggestion(err),
        },
    )
}

/// Dispatch a reviewer request
pub async fn handle(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let identity = match authorize(state, req, Some(Role::Reviewer)).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    let route = req.path.strip_prefix(PREFIX).unwrap_or_default();

    match (&req.method, route) {
        (&Method::POST, "/tech-radar/update") => update_radar(state, req, &identity).await,
        (_, "/tech-radar/update") => method_not_allowed(&req.method, &req.path),
        _ => not_found_response(&req.path),
    }
}

async fn update_radar(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let payload_size = req.body.len();
    let body: Value = match req.json() {
        Ok(body) => body,
        Err(e) => return review_error(&e),
    };

    match state.radar.update_entries(body.get("entries"), "review").await {
        Ok(outcome) => {
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::RadarUpdated, identity, Role::Reviewer)
                        .with_records(outcome.entries_processed)
                        .with_bytes(outcome.document_bytes)
                        .with_metadata(json!({
                            "inserted": outcome.inserted,
                            "updated": outcome.updated,
                            "payloadSize": payload_size,
                        })),
                )
                .await;
            json_response(
                StatusCode::OK,
                &json!({
                    "message": "Tech radar updated successfully",
                    "entriesProcessed": outcome.entries_processed,
                    "payloadSize": payload_size,
                }),
            )
        }
        Err(e) => review_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_review_error_shape() {
        let resp = review_error(&LandscapeError::PayloadTooLarge("2048 bytes".into()));
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["type"], "PAYLOAD_TOO_LARGE");
        assert_eq!(value["suggestion"], "Submit fewer entries per request");
    }

    #[test]
    fn test_storage_failures_are_500() {
        let resp = review_error(&LandscapeError::Storage("timeout".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
