//! Unauthenticated read endpoints under `/api`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::{debug, error};

use super::{error_message, error_response, json_response, ApiRequest};
use crate::server::AppState;
use crate::services::RepositoryFilter;

fn filter_from(req: &ApiRequest) -> RepositoryFilter {
    RepositoryFilter {
        since: req.query("datetime").map(str::to_string),
        archived: req.query("archived").map(str::to_string),
    }
}

/// GET /api/tech-radar/json
pub async fn tech_radar(state: &AppState) -> Response<Full<Bytes>> {
    match state.radar.radar_json().await {
        Ok(doc) => json_response(StatusCode::OK, &doc),
        Err(e) => {
            error!(error = %e, "Error fetching tech radar data");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch tech radar data")
        }
    }
}

/// GET /api/csv
pub async fn project_csv(state: &AppState) -> Response<Full<Bytes>> {
    match state.projects.rows().await {
        Ok(rows) => {
            debug!(rows = rows.len(), "Serving project records");
            json_response(StatusCode::OK, &rows)
        }
        Err(e) => {
            error!(error = %e, "Error fetching project data");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch project data")
        }
    }
}

/// GET /api/json
pub async fn repository_stats(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    match state.repositories.stats(&filter_from(req)).await {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(e) => {
            error!(error = %e, "Error fetching repository statistics");
            error_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch repository statistics",
            )
        }
    }
}

/// GET /api/repository/project/json
pub async fn project_repositories(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    match state
        .repositories
        .project_stats(req.query("repositories"), &filter_from(req))
        .await
    {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(e) if e.status_code().is_client_error() => error_response(&e),
        Err(e) => {
            error!(error = %e, "Error fetching project repository statistics");
            error_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch repository statistics",
            )
        }
    }
}

/// GET /api/banners
pub async fn active_banners(state: &AppState) -> Response<Full<Bytes>> {
    match state.banners.active().await {
        Ok(doc) => json_response(StatusCode::OK, &doc),
        Err(e) => {
            error!(error = %e, "Error fetching banners");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch banner messages")
        }
    }
}

/// GET /api/banners/all
pub async fn all_banners(state: &AppState) -> Response<Full<Bytes>> {
    match state.banners.all().await {
        Ok(doc) => json_response(StatusCode::OK, &doc),
        Err(e) => {
            error!(error = %e, "Error fetching banners");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch banner messages")
        }
    }
}
