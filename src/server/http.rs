//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Bodies are buffered up
//! to `MAX_BODY_BYTES` before routing; [`route`] takes a fully buffered
//! request so it can be driven directly in tests.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::rate_limit::{self, RouteGroup};
use super::AppState;
use crate::cache;
use crate::routes::{
    self, addressbook, admin, alerts, copilot, error_message, error_response, health,
    json_response, not_found_response, preflight_response, public, review, user, ApiRequest,
};
use crate::types::{LandscapeError, Result};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Accept connections until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Landscape listening on {}", state.args.listen);
    info!(
        "Storage backend: {} (buckets: {}, {}, {})",
        state.documents.backend(),
        state.documents.buckets().main,
        state.documents.buckets().tat,
        state.documents.buckets().copilot
    );

    rate_limit::spawn_cleanup_task(Arc::clone(&state.rate_limiter), RATE_LIMIT_CLEANUP_INTERVAL);
    info!(
        "Rate limiting enabled ({} requests per minute per client and route group)",
        state.args.rate_limit_per_minute
    );

    cache::spawn_cleanup_task(state.copilot.history_cache(), CACHE_CLEANUP_INTERVAL);
    info!(
        "Teams history cached for {}s",
        state.args.teams_history_ttl_secs
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Client address, preferring the first `X-Forwarded-For` hop
pub fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .unwrap_or_else(|| remote.ip())
}

fn payload_too_large(path: &str, limit: usize) -> Response<Full<Bytes>> {
    let err = LandscapeError::PayloadTooLarge(format!("request body exceeds {} bytes", limit));
    if path.starts_with(review::PREFIX) {
        review::review_error(&err)
    } else {
        error_response(&err)
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Buffer the body, enforce limits and hand off to [`route`]
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let limit = state.args.max_body_bytes;
    if declared_length(&parts.headers).is_some_and(|len| len > limit) {
        warn!(%addr, limit, "Rejected oversized request body");
        return Ok(payload_too_large(parts.uri.path(), limit));
    }

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(%addr, limit, "Rejected oversized request body");
            return Ok(payload_too_large(parts.uri.path(), limit));
        }
        Err(e) => {
            debug!(%addr, "Failed to read request body: {}", e);
            return Ok(error_message(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    let request = ApiRequest::new(parts.method, &uri, addr)
        .with_headers(parts.headers)
        .with_body(body);

    if request.method != Method::OPTIONS {
        if let Some(group) = RouteGroup::for_path(&request.path) {
            let ip = client_ip(&request.headers, addr);
            if !state.rate_limiter.allow(ip, group) {
                return Ok(json_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    &json!({ "error": group.message(), "retryAfter": "1 minute" }),
                ));
            }
        }
    }

    Ok(route(&state, request).await)
}

/// Dispatch a buffered request to its handler
pub async fn route(state: &AppState, req: ApiRequest) -> Response<Full<Bytes>> {
    if req.method == Method::OPTIONS {
        return preflight_response();
    }

    let path = req.path.as_str();
    if path.starts_with(admin::PREFIX) {
        return admin::handle(state, &req).await;
    }
    if path.starts_with(review::PREFIX) {
        return review::handle(state, &req).await;
    }
    if path.starts_with(copilot::PREFIX) {
        return copilot::handle(state, &req).await;
    }
    if path.starts_with(user::PREFIX) {
        return user::handle(state, &req).await;
    }

    match (&req.method, path) {
        (&Method::GET, "/api/health") => health::health_check(state),
        (&Method::GET, "/api/tech-radar/json") => public::tech_radar(state).await,
        (&Method::GET, "/api/csv") => public::project_csv(state).await,
        (&Method::GET, "/api/json") => public::repository_stats(state, &req).await,
        (&Method::GET, "/api/repository/project/json") => {
            public::project_repositories(state, &req).await
        }
        (&Method::GET, "/api/banners") => public::active_banners(state).await,
        (&Method::GET, "/api/banners/all") => public::all_banners(state).await,
        (&Method::POST, "/api/alert") => alerts::send_alert(state, &req).await,
        (&Method::GET, "/addressbook/api/request") => addressbook::lookup(state, &req).await,
        (
            _,
            "/api/health" | "/api/tech-radar/json" | "/api/csv" | "/api/json"
            | "/api/repository/project/json" | "/api/banners" | "/api/banners/all" | "/api/alert"
            | "/addressbook/api/request",
        ) => routes::method_not_allowed(&req.method, path),
        _ => not_found_response(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let remote: SocketAddr = "10.0.0.9:443".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, remote), remote.ip());

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, remote), "203.0.113.7".parse::<IpAddr>().unwrap());

        headers.insert("x-forwarded-for", "garbage".parse().unwrap());
        assert_eq!(client_ip(&headers, remote), remote.ip());
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, "2048".parse().unwrap());
        assert_eq!(declared_length(&headers), Some(2048));
    }
}
