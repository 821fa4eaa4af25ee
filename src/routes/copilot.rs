//! Copilot dashboard routes under `/copilot/api`
//!
//! Organisation data is fetched with the GitHub App; anything about the
//! signed-in user needs their OAuth token, carried in the `githubUserToken`
//! cookie or an `Authorization: Bearer` header.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    error_message, error_response, json_response, method_not_allowed, not_found_response,
    redirect_response, with_cookie, ApiRequest,
};
use crate::auth::bearer_token;
use crate::server::AppState;
use crate::types::LandscapeError;

pub const PREFIX: &str = "/copilot/api";

pub const USER_TOKEN_COOKIE: &str = "githubUserToken";
pub const OAUTH_STATE_COOKIE: &str = "githubOAuthState";

/// Lifetime of the user token cookie
const USER_TOKEN_MAX_AGE_SECS: u64 = 8 * 60 * 60;
const OAUTH_STATE_MAX_AGE_SECS: u64 = 10 * 60;

#[derive(Debug, Deserialize)]
struct TokenRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// Dispatch a Copilot request
pub async fn handle(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let route = req.path.strip_prefix(PREFIX).unwrap_or_default();

    match (&req.method, route) {
        (&Method::GET, "/org/live") => org_live(state).await,
        (&Method::GET, "/org/historic") => org_historic(state).await,
        (&Method::GET, "/seats") => seats(state).await,
        (&Method::GET, "/team/live") => team_live(state, req).await,
        (&Method::GET, "/teams/history") => teams_history(state, req).await,
        (&Method::GET, "/github/oauth/login") => oauth_login(state),
        (&Method::POST, "/github/oauth/token") => oauth_token(state, req).await,
        (&Method::POST, "/github/oauth/logout") => oauth_logout(state),
        (&Method::GET, "/auth/status") => auth_status(req),
        (&Method::GET, "/teams") => user_teams(state, req).await,
        (&Method::GET, "/teams/admin-status") => admin_status(state, req).await,
        (
            _,
            "/org/live" | "/org/historic" | "/seats" | "/team/live" | "/teams/history"
            | "/github/oauth/login" | "/github/oauth/token" | "/github/oauth/logout" | "/auth/status"
            | "/teams" | "/teams/admin-status",
        ) => method_not_allowed(&req.method, &req.path),
        _ => not_found_response(&req.path),
    }
}

/// OAuth token from the cookie, falling back to a bearer header
pub fn user_token(req: &ApiRequest) -> Option<&str> {
    req.cookie(USER_TOKEN_COOKIE).or_else(|| bearer_token(&req.headers))
}

fn missing_token() -> Response<Full<Bytes>> {
    error_message(StatusCode::UNAUTHORIZED, "Missing GitHub user token")
}

fn cookie(state: &AppState, name: &str, value: &str, max_age: u64, same_site: &str) -> String {
    let secure = if state.args.dev_mode { "" } else { "; Secure" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}{}",
        name, value, same_site, max_age, secure
    )
}

/// Upstream failures keep client statuses and surface their message
fn failure(e: LandscapeError, what: &str) -> Response<Full<Bytes>> {
    if e.status_code().is_client_error() {
        warn!(error = %e, "{} rejected", what);
        error_response(&e)
    } else {
        error!(error = %e, "Error fetching {}", what);
        error_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
    }
}

async fn org_live(state: &AppState) -> Response<Full<Bytes>> {
    match state.github.org_copilot_metrics().await {
        Ok(metrics) => json_response(StatusCode::OK, &metrics),
        Err(e) => failure(e, "organisation Copilot metrics"),
    }
}

async fn org_historic(state: &AppState) -> Response<Full<Bytes>> {
    match state.copilot.historic_usage().await {
        Ok(usage) => json_response(StatusCode::OK, &usage),
        Err(e) => failure(e, "historic Copilot usage"),
    }
}

async fn seats(state: &AppState) -> Response<Full<Bytes>> {
    match state.github.copilot_seats().await {
        Ok(seats) => json_response(StatusCode::OK, &seats),
        Err(e) => failure(e, "Copilot seats"),
    }
}

async fn team_live(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let Some(slug) = req.query("teamSlug") else {
        return error_message(StatusCode::BAD_REQUEST, "Missing teamSlug");
    };
    match state.github.team_copilot_metrics(slug).await {
        Ok(metrics) => json_response(StatusCode::OK, &metrics),
        Err(e) => failure(e, "team Copilot metrics"),
    }
}

async fn teams_history(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    match state.copilot.team_history(req.query("teamSlug")).await {
        Ok(history) => json_response(StatusCode::OK, &history),
        Err(e) => failure(e, "teams history"),
    }
}

fn oauth_login(state: &AppState) -> Response<Full<Bytes>> {
    let nonce = Uuid::new_v4().simple().to_string();
    match state.github.authorize_url(&nonce) {
        Ok(url) => redirect_response(
            &url,
            &[cookie(state, OAUTH_STATE_COOKIE, &nonce, OAUTH_STATE_MAX_AGE_SECS, "Lax")],
        ),
        Err(e) => failure(e, "GitHub OAuth login URL"),
    }
}

async fn oauth_token(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let body: TokenRequest = match req.json() {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };
    let Some(code) = body.code.filter(|c| !c.is_empty()) else {
        return error_message(StatusCode::BAD_REQUEST, "Missing OAuth code");
    };
    if let (Some(expected), Some(given)) = (req.cookie(OAUTH_STATE_COOKIE), body.state.as_deref()) {
        if expected != given {
            warn!("OAuth state mismatch");
            return error_message(StatusCode::BAD_REQUEST, "Invalid OAuth state");
        }
    }

    match state.github.exchange_code(&code).await {
        Ok(token) => {
            info!("GitHub user authenticated");
            let resp = json_response(StatusCode::OK, &json!({ "message": "Authenticated with GitHub" }));
            let resp = with_cookie(
                resp,
                &cookie(state, USER_TOKEN_COOKIE, &token, USER_TOKEN_MAX_AGE_SECS, "Strict"),
            );
            with_cookie(resp, &cookie(state, OAUTH_STATE_COOKIE, "", 0, "Lax"))
        }
        Err(e) => failure(e, "GitHub OAuth token"),
    }
}

fn oauth_logout(state: &AppState) -> Response<Full<Bytes>> {
    let resp = json_response(StatusCode::OK, &json!({ "message": "Logged out of GitHub" }));
    with_cookie(resp, &cookie(state, USER_TOKEN_COOKIE, "", 0, "Strict"))
}

fn auth_status(req: &ApiRequest) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({ "authenticated": user_token(req).is_some() }),
    )
}

async fn user_teams(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let Some(token) = user_token(req) else {
        return missing_token();
    };
    match state.github.user_teams(token).await {
        Ok(teams) => json_response(StatusCode::OK, &teams),
        Err(e) => failure(e, "user teams"),
    }
}

async fn admin_status(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let Some(token) = user_token(req) else {
        return missing_token();
    };
    match state.copilot.admin_status(state.github.as_ref(), token).await {
        Ok(status) => json_response(StatusCode::OK, &status),
        Err(e) => failure(e, "Copilot admin status"),
    }
}
