//! POST /api/alert

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{error, info};

use super::{error_message, json_response, ApiRequest};
use crate::server::AppState;
use crate::types::LandscapeError;

pub async fn send_alert(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let payload: Value = match serde_json::from_slice(&req.body) {
        Ok(value) => value,
        Err(_) => {
            return error_message(StatusCode::BAD_REQUEST, "Invalid payload: expected JSON object")
        }
    };

    match state.alerts.send(&payload).await {
        Ok(response) => {
            info!(remote = %req.remote_addr, "Alert forwarded");
            json_response(
                StatusCode::OK,
                &json!({ "message": "Alert sent successfully", "response": response }),
            )
        }
        Err(LandscapeError::Validation(msg)) => error_message(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            error!(error = %e, "Failed to send alert");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
