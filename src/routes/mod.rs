//! HTTP routes
//!
//! One module per route group. Handlers take the parsed [`ApiRequest`] and
//! return complete responses; the server owns body limits, rate limiting and
//! dispatch.

pub mod addressbook;
pub mod admin;
pub mod alerts;
pub mod copilot;
pub mod health;
pub mod public;
pub mod review;
pub mod user;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::http::response::Builder;
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::auth::{require_role, Identity, Role};
use crate::server::AppState;
use crate::types::{LandscapeError, Result};

/// A fully buffered request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: SocketAddr,
}

impl ApiRequest {
    pub fn new(method: Method, uri: &str, remote_addr: SocketAddr) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method,
            path: path.to_string(),
            query: parse_query_params(query),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Non-empty query parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Decode the body as JSON; an empty body decodes from `{}`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body: &[u8] = if self.body.is_empty() { b"{}" } else { &self.body };
        serde_json::from_slice(body)
            .map_err(|e| LandscapeError::Validation(format!("Invalid JSON body: {}", e)))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        cookie_value(&self.headers, name)
    }
}

/// Parse query string into key-value map
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    if query.is_empty() {
        return HashMap::new();
    }

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = decode_component(parts.next()?);
            let value = decode_component(parts.next().unwrap_or(""));
            Some((key, value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Value of a cookie from the `Cookie` header
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn base(status: StatusCode) -> Builder {
    Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", "*")
}

/// Finish a builder, degrading to a bare 500 if headers were invalid
pub fn finish(builder: Builder, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    builder.body(Full::new(body.into())).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut fallback = Response::new(Full::new(Bytes::from_static(
            br#"{"error":"Internal error"}"#,
        )));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// JSON response with CORS headers
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    json_response_with(base(status), body)
}

/// JSON response on a caller-prepared builder
pub fn json_response_with<T: Serialize + ?Sized>(builder: Builder, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => finish(builder.header(header::CONTENT_TYPE, "application/json"), bytes),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            finish(
                base(StatusCode::INTERNAL_SERVER_ERROR).header(header::CONTENT_TYPE, "application/json"),
                r#"{"error":"Internal serialization error"}"#,
            )
        }
    }
}

/// `{error}` body with the error's status
pub fn error_response(err: &LandscapeError) -> Response<Full<Bytes>> {
    if err.status_code().is_server_error() {
        error!(kind = err.kind(), "Request failed: {}", err);
    }
    json_response(err.status_code(), &json!({ "error": err.to_string() }))
}

/// `{error}` body with an explicit status
pub fn error_message(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

/// `{message}` body
pub fn message_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "message": message }))
}

/// Plain text response
pub fn text_response(status: StatusCode, text: impl Into<Bytes>) -> Response<Full<Bytes>> {
    finish(
        base(status).header(header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        text,
    )
}

/// Redirect with optional cookies
pub fn redirect_response(location: &str, cookies: &[String]) -> Response<Full<Bytes>> {
    let mut builder = base(StatusCode::FOUND).header(header::LOCATION, location);
    for cookie in cookies {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    finish(builder, Bytes::new())
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    finish(
        base(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
        Bytes::new(),
    )
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({ "error": "Not Found", "path": path }),
    )
}

/// Method not allowed on a known path
pub fn method_not_allowed(method: &Method, path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "error": format!("{} not allowed on {}", method, path) }),
    )
}

/// Append a `Set-Cookie` header
pub fn with_cookie(mut response: Response<Full<Bytes>>, cookie: &str) -> Response<Full<Bytes>> {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Dropping invalid cookie header: {}", e),
    }
    response
}

/// Verify the caller and check `role`.
///
/// Failures are returned as ready responses: 401 `{message, error}` for bad
/// credentials and 403 `{message}` for a missing role.
pub async fn authorize(
    state: &AppState,
    req: &ApiRequest,
    role: Option<Role>,
) -> std::result::Result<Identity, Response<Full<Bytes>>> {
    let identity = match state.verifier.verify(&req.headers).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(path = %req.path, "Authentication failed: {}", e);
            return Err(json_response(
                StatusCode::UNAUTHORIZED,
                &json!({ "message": "Unauthorized", "error": e.to_string() }),
            ));
        }
    };

    if let Some(role) = role {
        if let Err(e) = require_role(&identity, role) {
            warn!(email = %identity.email, %role, "Role check failed");
            return Err(message_response(StatusCode::FORBIDDEN, &e.to_string()));
        }
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_request_splits_query() {
        let req = ApiRequest::new(Method::GET, "/api/json?datetime=2024-01-01&archived=false", addr());
        assert_eq!(req.path, "/api/json");
        assert_eq!(req.query("datetime"), Some("2024-01-01"));
        assert_eq!(req.query("archived"), Some("false"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn test_query_decoding() {
        let params = parse_query_params("q=jane%40ons.gov.uk,bob&name=a+b&flag");
        assert_eq!(params["q"], "jane@ons.gov.uk,bob");
        assert_eq!(params["name"], "a b");
        assert_eq!(params["flag"], "");
    }

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "a=1; githubUserToken=gho_x; b=".parse().unwrap());
        assert_eq!(cookie_value(&headers, "githubUserToken"), Some("gho_x"));
        assert_eq!(cookie_value(&headers, "b"), None);
        assert_eq!(cookie_value(&headers, "c"), None);
    }

    #[test]
    fn test_empty_body_decodes_as_object() {
        let req = ApiRequest::new(Method::POST, "/x", addr());
        let value: serde_json::Value = req.json().unwrap();
        assert!(value.as_object().unwrap().is_empty());

        let req = req.with_body("{not json");
        assert!(matches!(req.json::<serde_json::Value>(), Err(LandscapeError::Validation(_))));
    }

    #[test]
    fn test_error_response_status() {
        let resp = error_response(&LandscapeError::Validation("bad".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }
}
