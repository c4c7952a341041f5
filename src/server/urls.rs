//! `/v1/url` handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::responses::{edit_conflict, failed_validation, server_error, store_read_error};
use super::AppState;
use crate::storage::{Paging, StoreError, UrlFilter, UrlRecord, URL_COLUMNS};
use crate::urlutil::{is_absolute_url, is_valid_scheme, parse_base_url};
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
pub struct ListUrlParams {
    pub url: Option<String>,
    pub is_monitored: Option<bool>,
    pub is_alive: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

pub async fn list_urls(
    State(state): State<AppState>,
    Query(params): Query<ListUrlParams>,
) -> Response {
    let filter = UrlFilter {
        url: params.url.unwrap_or_default(),
        is_monitored: params.is_monitored,
        is_alive: params.is_alive,
    };
    let paging = Paging::new(
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(10),
        params.sort.as_deref().unwrap_or("id"),
        URL_COLUMNS,
    );

    let mut v = Validator::new();
    paging.validate(&mut v);
    if !v.is_valid() {
        return failed_validation(v.errors());
    }

    match state.store.urls.get_all(&filter, &paging).await {
        Ok((urls, metadata)) => (
            StatusCode::OK,
            Json(json!({"url_list": urls, "metadata": metadata})),
        )
            .into_response(),
        Err(e) => store_read_error(e),
    }
}

pub async fn get_url_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.urls.get_by_id(id).await {
        Ok(url) => (StatusCode::OK, Json(json!({"url": url}))).into_response(),
        Err(e) => store_read_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
}

/// Creates a monitored URL.
pub async fn create_url(
    State(state): State<AppState>,
    Json(input): Json<CreateUrlRequest>,
) -> Response {
    let mut v = Validator::new();
    let url = input.url.trim();
    v.check(!url.is_empty(), "url", "must be provided");
    v.check(is_absolute_url(url), "url", "must be absolute URL");
    if let Ok((parsed, _)) = parse_base_url(url) {
        v.check(
            is_valid_scheme(parsed.scheme()),
            "url",
            "scheme must be http/https",
        );
    }
    if !v.is_valid() {
        return failed_validation(v.errors());
    }

    let canonical = url.trim_end_matches('/').to_lowercase();
    let mut rec = UrlRecord::new(canonical, true);
    match state.store.urls.insert(&mut rec).await {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return (
                StatusCode::CONFLICT,
                Json(json!({"error": format!("url '{}' is already present", rec.url)})),
            )
                .into_response();
        }
        Err(e) => return server_error(e),
    }

    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("/v1/url/{}", rec.id))],
        Json(json!({"url": rec})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateUrlRequest {
    /// Absent means unchanged.
    pub is_monitored: Option<bool>,
}

/// Toggles `is_monitored` on a URL.
pub async fn update_url(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUrlRequest>,
) -> Response {
    let mut rec = match state.store.urls.get_by_id(id).await {
        Ok(rec) => rec,
        Err(e) => return store_read_error(e),
    };

    if let Some(is_monitored) = input.is_monitored {
        rec.is_monitored = is_monitored;
    }

    match state.store.urls.update(&mut rec).await {
        Ok(()) => (StatusCode::OK, Json(json!({"url": rec}))).into_response(),
        Err(StoreError::EditConflict) => edit_conflict(),
        Err(e) => server_error(e),
    }
}
