//! `/v1/page` handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::responses::{failed_validation, store_read_error};
use super::AppState;
use crate::storage::{Paging, PAGE_COLUMNS};
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
pub struct ListPageParams {
    pub url_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

/// Lists snapshots of one URL.
pub async fn list_pages(
    State(state): State<AppState>,
    Query(params): Query<ListPageParams>,
) -> Response {
    let url_id = params.url_id.unwrap_or(0);
    let paging = Paging::new(
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(10),
        params.sort.as_deref().unwrap_or("id"),
        PAGE_COLUMNS,
    );

    let mut v = Validator::new();
    v.check(url_id > 0, "url_id", "must be provided and greater than zero");
    paging.validate(&mut v);
    if !v.is_valid() {
        return failed_validation(v.errors());
    }

    match state.store.pages.get_all_by_url(url_id, &paging).await {
        Ok((pages, metadata)) => (
            StatusCode::OK,
            Json(json!({"page_list": pages, "metadata": metadata})),
        )
            .into_response(),
        Err(e) => store_read_error(e),
    }
}

pub async fn get_page_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.pages.get_by_id(id).await {
        Ok(page) => (StatusCode::OK, Json(json!({"page": page}))).into_response(),
        Err(e) => store_read_error(e),
    }
}
