//! Crawl and saveContent job handlers.
//!
//! Both operations are singletons: starting one while it is already
//! running answers 503 with a Retry-After header. Worker log lines are
//! mirrored onto a broadcast channel and exposed as a server-sent-events
//! stream.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use futures::StreamExt;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use super::responses::{bad_request, failed_validation, still_running};
use super::AppState;
use crate::config::{
    self, default_user_agent, marked_url_args, parse_cutoff_date, parse_duration, separate_args,
    CrawlConfig,
};
use crate::export::save_db_content_to_disk;
use crate::run::run_crawl;
use crate::urlutil::parse_base_url;
use crate::validation::Validator;

/// JSON body of `POST /v1/crawl`; keys mirror the CLI flags, absent fields
/// take the flag defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlRequest {
    pub baseurl: String,
    pub murls: Option<String>,
    pub days: Option<u32>,
    #[serde(rename = "idle-time")]
    pub idle_time: Option<String>,
    pub ignore: Option<String>,
    pub n: Option<usize>,
    #[serde(rename = "req-delay")]
    pub req_delay: Option<String>,
    pub retry: Option<u32>,
    pub ua: Option<String>,
    #[serde(rename = "update-hrefs")]
    pub update_hrefs: Option<bool>,
}

impl CrawlRequest {
    fn into_config(self) -> Result<CrawlConfig, Response> {
        let (base_url, base) = parse_base_url(&self.baseurl)
            .map_err(|e| bad_request(format!("could not parse baseurl: {e}")))?;
        let request_delay = parse_duration(self.req_delay.as_deref().unwrap_or("50ms"))
            .map_err(|e| bad_request(format!("could not parse req-delay: {e}")))?;
        let idle_timeout = parse_duration(self.idle_time.as_deref().unwrap_or("10s"))
            .map_err(|e| bad_request(format!("could not parse idle-time: {e}")))?;

        let cfg = CrawlConfig {
            base_url,
            base,
            workers: self.n.unwrap_or(10),
            idle_timeout,
            request_delay,
            retry_times: self.retry.unwrap_or(2),
            update_days: self.days.unwrap_or(1),
            user_agent: self.ua.unwrap_or_else(default_user_agent),
            marked_urls: marked_url_args(self.murls.as_deref().unwrap_or_default()),
            ignore_patterns: separate_args(self.ignore.as_deref().unwrap_or_default()),
            update_hrefs: self.update_hrefs.unwrap_or(false),
        };

        let mut v = Validator::new();
        cfg.validate(&mut v);
        if !v.is_valid() {
            return Err(failed_validation(v.errors()));
        }
        Ok(cfg)
    }
}

pub async fn initiate_crawl(
    State(state): State<AppState>,
    Json(input): Json<CrawlRequest>,
) -> Response {
    if state.crawl.is_running() {
        return still_running();
    }

    let cfg = match input.into_config() {
        Ok(cfg) => cfg,
        Err(response) => return response,
    };

    let Some(cancel) = state.crawl.try_begin(&state.shutdown) else {
        return still_running();
    };

    let controller = Arc::clone(&state.crawl);
    let store = Arc::clone(&state.store);
    let log_tx = controller.log_tx.clone();
    tokio::spawn(async move {
        match run_crawl(cfg, store, cancel, Some(log_tx)).await {
            Ok(report) => {
                let line = format!(
                    "Done crawling: loaded {} URLs, {} workers, {:.2}s",
                    report.loaded_from_store, report.workers, report.elapsed_seconds
                );
                info!("{line}");
                controller.log(line);
            }
            Err(e) => {
                let line = format!("Crawl failed: {e}");
                error!("{line}");
                controller.log(line);
            }
        }
        controller.finish();
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "request accepted, crawling now"})),
    )
        .into_response()
}

pub async fn cancel_crawl(State(state): State<AppState>) -> Response {
    if state.crawl.cancel() {
        (
            StatusCode::ACCEPTED,
            Json(json!({"status": "previous crawl was cancelled"})),
        )
            .into_response()
    } else {
        (StatusCode::OK, Json(json!({"status": "not crawling"}))).into_response()
    }
}

pub async fn crawl_status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({"crawling": state.crawl.is_running()})),
    )
        .into_response()
}

/// Server-sent-events stream of the crawl's log lines.
pub async fn crawl_logstream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.crawl.log_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|line| async move {
        // lagged receivers just skip the lines they missed
        line.ok().map(|l| Ok(Event::default().data(l)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// JSON body of `POST /v1/saveContent`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveContentRequest {
    pub baseurl: String,
    pub murls: Option<String>,
    pub path: Option<String>,
    pub date: Option<String>,
}

pub async fn initiate_save_content(
    State(state): State<AppState>,
    Json(input): Json<SaveContentRequest>,
) -> Response {
    if state.save_content.is_running() {
        return still_running();
    }

    let (_, base) = match parse_base_url(&input.baseurl) {
        Ok(parsed) => parsed,
        Err(e) => return bad_request(format!("could not parse baseurl: {e}")),
    };
    let cutoff = match parse_cutoff_date(input.date.as_deref()) {
        Ok(cutoff) => cutoff,
        Err(e) => return bad_request(e),
    };
    let save_path = input
        .path
        .map(PathBuf::from)
        .unwrap_or_else(config::default_save_path);
    let marked = marked_url_args(input.murls.as_deref().unwrap_or_default());

    let Some(cancel) = state.save_content.try_begin(&state.shutdown) else {
        return still_running();
    };

    let controller = Arc::clone(&state.save_content);
    let store = Arc::clone(&state.store);
    tokio::spawn(async move {
        match save_db_content_to_disk(&store, &base, &save_path, cutoff, &marked, &cancel).await {
            Ok(files) => {
                let line = format!("Transfer completed: {files} file(s) written");
                info!("{line}");
                controller.log(line);
            }
            Err(e) => {
                let line = format!("Error while saving to disk: {e}");
                error!("{line}");
                controller.log(line);
            }
        }
        controller.finish();
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "request accepted, saving content to disk"})),
    )
        .into_response()
}

pub async fn cancel_save_content(State(state): State<AppState>) -> Response {
    if state.save_content.cancel() {
        (
            StatusCode::ACCEPTED,
            Json(json!({"status": "previous save was cancelled"})),
        )
            .into_response()
    } else {
        (StatusCode::OK, Json(json!({"status": "not saving"}))).into_response()
    }
}

pub async fn save_content_status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({"saving": state.save_content.is_running()})),
    )
        .into_response()
}
