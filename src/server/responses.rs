//! Shared JSON response helpers for the management API.

use std::collections::BTreeMap;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;

use crate::storage::StoreError;

pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "the requested resource could not be found"})),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    not_found_response()
}

pub fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

pub fn failed_validation(errors: &BTreeMap<String, String>) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": errors}))).into_response()
}

pub fn edit_conflict() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({"error": "unable to update the record due to an edit conflict, please try again"})),
    )
        .into_response()
}

pub fn server_error(err: impl std::fmt::Display) -> Response {
    error!("server error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "the server encountered a problem and could not process your request"})),
    )
        .into_response()
}

/// 503 with a Retry-After header; returned when a singleton operation is
/// already running.
pub fn still_running() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "60")],
        Json(json!({"error": "previous request is still running"})),
    )
        .into_response()
}

/// Maps a store error from a read path onto the API surface.
pub fn store_read_error(err: StoreError) -> Response {
    match err {
        StoreError::RecordNotFound => not_found_response(),
        StoreError::InvalidOrderBy(_) => bad_request(err.to_string()),
        other => server_error(other),
    }
}
