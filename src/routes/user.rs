//! Signed-in user routes under `/user/api`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Method, Response, StatusCode};
use serde_json::json;
use tracing::info;

use super::{authorize, json_response, method_not_allowed, not_found_response, with_cookie, ApiRequest};
use crate::server::AppState;

pub const PREFIX: &str = "/user/api";

/// Session cookies set by the load balancer after Cognito sign-in
pub const ALB_SESSION_COOKIES: [&str; 2] = ["AWSELBAuthSessionCookie-0", "AWSELBAuthSessionCookie-1"];

pub async fn handle(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let route = req.path.strip_prefix(PREFIX).unwrap_or_default();
    match (&req.method, route) {
        (&Method::GET, "/info") => info(state, req).await,
        (&Method::GET | &Method::POST, "/logout") => logout(state, req),
        (_, "/info" | "/logout") => method_not_allowed(&req.method, &req.path),
        _ => not_found_response(&req.path),
    }
}

async fn info(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let identity = match authorize(state, req, None).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };

    if state.verifier.is_development() {
        json_response(
            StatusCode::OK,
            &json!({
                "message": "User information retrieved successfully (local dev mode)",
                "user": identity,
                "development_mode": true,
            }),
        )
    } else {
        json_response(
            StatusCode::OK,
            &json!({
                "message": "User information retrieved successfully",
                "user": identity,
            }),
        )
    }
}

/// Cognito hosted UI logout URL returning the browser to `return_to`
pub fn logout_url(domain: &str, client_id: &str, return_to: &str) -> String {
    let domain = domain
        .trim_start_matches("https://")
        .trim_end_matches('/');
    format!(
        "https://{}/logout?client_id={}&logout_uri={}",
        domain,
        urlencoding::encode(client_id),
        urlencoding::encode(return_to)
    )
}

fn logout(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let cognito = &state.args.cognito;
    let host = req
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let return_to = format!("https://{}/", host);

    let url = match (&cognito.cognito_domain, &cognito.cognito_client_id) {
        (Some(domain), Some(client_id)) => Some(logout_url(domain, client_id, &return_to)),
        _ => None,
    };
    info!(configured = url.is_some(), "User logout");

    let mut resp = json_response(
        StatusCode::OK,
        &json!({ "message": "Logged out successfully", "logoutUrl": url }),
    );
    for name in ALB_SESSION_COOKIES {
        resp = with_cookie(
            resp,
            &format!("{}=; Path=/; Max-Age=0; HttpOnly; Secure", name),
        );
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logout_url() {
        assert_eq!(
            logout_url(
                "https://landscape.auth.eu-west-2.amazoncognito.com/",
                "client123",
                "https://landscape.example/"
            ),
            "https://landscape.auth.eu-west-2.amazoncognito.com/logout?client_id=client123&logout_uri=https%3A%2F%2Flandscape.example%2F"
        );
    }
}
