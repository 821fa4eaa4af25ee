//! Health check endpoint

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response_with;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since startup
    pub uptime: f64,
    pub pid: u32,
    pub version: &'static str,
}

/// GET /api/health
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        pid: std::process::id(),
        version: env!("CARGO_PKG_VERSION"),
    };

    json_response_with(
        Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Cache-Control", "no-cache")
            .header("X-Health-Check", "true"),
        &body,
    )
}
