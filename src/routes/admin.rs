//! Admin routes under `/admin/api`
//!
//! Every route requires the admin role. Mutations emit an audit event.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{error, info};

use super::{
    authorize, error_message, error_response, json_response, message_response, method_not_allowed,
    not_found_response, ApiRequest,
};
use crate::auth::{Identity, Role};
use crate::logging::{AuditAction, AuditEvent};
use crate::server::AppState;
use crate::services::{ArrayDataUpdate, NewBanner};
use crate::types::LandscapeError;

pub const PREFIX: &str = "/admin/api";

/// Dispatch an admin request
pub async fn handle(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let identity = match authorize(state, req, Some(Role::Admin)).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    let route = req.path.strip_prefix(PREFIX).unwrap_or_default();

    match (&req.method, route) {
        (&Method::GET, "/tech-radar") => radar(state).await,
        (&Method::POST, "/tech-radar/update") => update_radar(state, req, &identity).await,
        (&Method::GET, "/banners") => banners(state).await,
        (&Method::POST, "/banners/update") => add_banner(state, req, &identity).await,
        (&Method::POST, "/banners/toggle") => toggle_banner(state, req, &identity).await,
        (&Method::POST, "/banners/delete") => delete_banner(state, req, &identity).await,
        (&Method::GET, "/array-data") => array_data(state).await,
        (&Method::POST, "/array-data/update") => update_array_data(state, req, &identity).await,
        (&Method::POST, "/normalise-technology") => normalise(state, req, &identity).await,
        (
            _,
            "/tech-radar" | "/tech-radar/update" | "/banners" | "/banners/update" | "/banners/toggle"
            | "/banners/delete" | "/array-data" | "/array-data/update" | "/normalise-technology",
        ) => method_not_allowed(&req.method, &req.path),
        _ => not_found_response(&req.path),
    }
}

fn body(req: &ApiRequest) -> Result<Value, Response<Full<Bytes>>> {
    req.json::<Value>().map_err(|e| error_response(&e))
}

fn index_of(body: &Value) -> Option<i64> {
    body.get("index").and_then(Value::as_i64)
}

/// Client errors keep their message; anything else becomes `fallback`
/// Client errors keep their status; write conflicts that outlast the retries
/// fall back to 500 with the rest
fn failure(e: LandscapeError, fallback: &str) -> Response<Full<Bytes>> {
    if e.status_code().is_client_error() && !matches!(e, LandscapeError::Conflict(_)) {
        error_response(&e)
    } else {
        error!(error = %e, "{}", fallback);
        error_message(StatusCode::INTERNAL_SERVER_ERROR, fallback)
    }
}

async fn radar(state: &AppState) -> Response<Full<Bytes>> {
    match state.radar.radar_json().await {
        Ok(doc) => json_response(StatusCode::OK, &doc),
        Err(e) => failure(e, "Failed to fetch tech radar data"),
    }
}

async fn update_radar(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    match state.radar.update_entries(body.get("entries"), "admin").await {
        Ok(outcome) => {
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::RadarUpdated, identity, Role::Admin)
                        .with_records(outcome.entries_processed)
                        .with_bytes(outcome.document_bytes)
                        .with_metadata(json!({
                            "inserted": outcome.inserted,
                            "updated": outcome.updated,
                            "totalEntries": outcome.total_entries,
                        })),
                )
                .await;
            message_response(StatusCode::OK, "Tech radar updated successfully")
        }
        Err(e) => failure(e, "Failed to update tech radar"),
    }
}

async fn banners(state: &AppState) -> Response<Full<Bytes>> {
    match state.banners.all().await {
        Ok(doc) => json_response(StatusCode::OK, &doc),
        Err(e) => failure(e, "Failed to fetch banner messages"),
    }
}

async fn add_banner(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let banner: NewBanner = match body.get("banner").cloned().map(serde_json::from_value) {
        Some(Ok(banner)) => banner,
        _ => return error_message(StatusCode::BAD_REQUEST, "Invalid banner data"),
    };

    match state.banners.add(banner).await {
        Ok(banner) => {
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::BannerAdded, identity, Role::Admin)
                        .with_records(1)
                        .with_metadata(json!({ "title": banner.title, "pages": banner.pages })),
                )
                .await;
            message_response(StatusCode::OK, "Banner added successfully")
        }
        Err(e) => failure(e, "Failed to add banner"),
    }
}

async fn toggle_banner(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let index = index_of(&body);
    let show = body.get("show").and_then(Value::as_bool);

    match state.banners.toggle(index, show).await {
        Ok(shown) => {
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::BannerToggled, identity, Role::Admin)
                        .with_records(1)
                        .with_metadata(json!({ "index": index, "show": shown })),
                )
                .await;
            message_response(StatusCode::OK, "Banner visibility updated successfully")
        }
        Err(e) => failure(e, "Failed to update banner visibility"),
    }
}

async fn delete_banner(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let index = index_of(&body);

    match state.banners.delete(index).await {
        Ok(removed) => {
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::BannerDeleted, identity, Role::Admin)
                        .with_records(1)
                        .with_metadata(json!({ "index": index, "title": removed.title })),
                )
                .await;
            message_response(StatusCode::OK, "Banner deleted successfully")
        }
        Err(e) => failure(e, "Failed to delete banner"),
    }
}

async fn array_data(state: &AppState) -> Response<Full<Bytes>> {
    match state.technology.array_data().await {
        Ok(data) => json_response(StatusCode::OK, &data),
        Err(e) => {
            error!(error = %e, "Error fetching array data");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch technology data")
        }
    }
}

async fn update_array_data(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let update = match ArrayDataUpdate::from_request(&body) {
        Ok(update) => update,
        Err(e) => return error_response(&e),
    };

    match state.technology.update_array_data(&update).await {
        Ok(bytes) => {
            let (scope, records) = match &update {
                ArrayDataUpdate::AllCategories(items) => ("all".to_string(), items.len()),
                ArrayDataUpdate::Category { category, items } => (category.clone(), items.len()),
            };
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::ArrayDataUpdated, identity, Role::Admin)
                        .with_records(records)
                        .with_bytes(bytes)
                        .with_metadata(json!({ "scope": scope })),
                )
                .await;
            message_response(StatusCode::OK, &update.success_message())
        }
        Err(e) => failure(e, "Failed to update technology data"),
    }
}

async fn normalise(state: &AppState, req: &ApiRequest, identity: &Identity) -> Response<Full<Bytes>> {
    let body = match body(req) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let from = body.get("from").and_then(Value::as_str).unwrap_or_default();
    let to = body.get("to").and_then(Value::as_str).unwrap_or_default();

    match state.technology.normalise(from, to).await {
        Ok(outcome) => {
            info!(from, to, updated = outcome.updated_projects, "Normalised technology name");
            state
                .audit
                .log(
                    AuditEvent::new(AuditAction::TechnologyNormalised, identity, Role::Admin)
                        .with_records(outcome.updated_projects)
                        .with_metadata(json!({ "from": from, "to": to })),
                )
                .await;
            json_response(
                StatusCode::OK,
                &json!({
                    "message": "Technology names normalised successfully",
                    "updatedProjects": outcome.updated_projects,
                }),
            )
        }
        Err(e) => failure(e, "Failed to normalise technology names"),
    }
}
