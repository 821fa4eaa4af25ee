//! GET /addressbook/api/request

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::error;

use super::{error_message, json_response, ApiRequest};
use crate::server::AppState;
use crate::services::address_book::parse_query;

pub async fn lookup(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let ids = match parse_query(req.query("q")) {
        Ok(ids) => ids,
        Err(e) => return error_message(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.address_book.lookup(&ids).await {
        Ok(entries) => json_response(StatusCode::OK, &entries),
        Err(e) => {
            error!(error = %e, "Address book lookup failed");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
