//! Embedded management API.
//!
//! Serves the URL/Page models over JSON on `127.0.0.1:8100` and drives
//! crawl and export runs as singleton background jobs with a
//! server-sent-events log stream.

mod crawl;
mod pages;
mod responses;
mod urls;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use log::{debug, info};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::SERVER_PORT;
use crate::storage::Store;

const LOG_STREAM_CAPACITY: usize = 256;

/// Tracks one singleton background job (crawl or saveContent): whether it
/// is running, its cancellation token and the log broadcast channel.
pub struct JobController {
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    pub log_tx: broadcast::Sender<String>,
}

impl JobController {
    pub fn new() -> Self {
        let (log_tx, _) = broadcast::channel(LOG_STREAM_CAPACITY);
        Self {
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            log_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the singleton slot. Returns the job's cancellation token (a
    /// child of `parent` so server shutdown cancels running jobs too) or
    /// `None` when a job is already running.
    pub fn try_begin(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let token = parent.child_token();
        *self.cancel.lock().unwrap() = Some(token.clone());
        Some(token)
    }

    /// Releases the singleton slot.
    pub fn finish(&self) {
        *self.cancel.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Cancels the running job, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().unwrap().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn log(&self, line: String) {
        let _ = self.log_tx.send(line);
    }
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub crawl: Arc<JobController>,
    pub save_content: Arc<JobController>,
    /// Server-wide shutdown signal; job tokens are children of it.
    pub shutdown: CancellationToken,
}

/// Builds the API router over `state`.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/url", get(urls::list_urls).post(urls::create_url))
        .route(
            "/v1/url/:id",
            get(urls::get_url_by_id).patch(urls::update_url),
        )
        .route("/v1/page", get(pages::list_pages))
        .route("/v1/page/:id", get(pages::get_page_by_id))
        .route("/v1/crawl", post(crawl::initiate_crawl))
        .route("/v1/crawl/cancel", post(crawl::cancel_crawl))
        .route("/v1/crawl/status", get(crawl::crawl_status))
        .route("/v1/crawl/logstream", get(crawl::crawl_logstream))
        .route("/v1/saveContent", post(crawl::initiate_save_content))
        .route("/v1/saveContent/cancel", post(crawl::cancel_save_content))
        .route("/v1/saveContent/status", get(crawl::save_content_status))
        .fallback(responses::not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    debug!("{method} {uri} -> {}", response.status());
    response
}

/// Runs the management server until `shutdown` is cancelled.
pub async fn serve(store: Arc<Store>, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
    let state = AppState {
        store,
        crawl: Arc::new(JobController::new()),
        save_content: Arc::new(JobController::new()),
        shutdown: shutdown.clone(),
    };
    let app = routes(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", SERVER_PORT))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind server to port {SERVER_PORT}: {e}"))?;

    info!("starting server on 127.0.0.1:{SERVER_PORT}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;
    info!("stopped server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_controller_singleton() {
        let controller = JobController::new();
        let parent = CancellationToken::new();
        let token = controller.try_begin(&parent).expect("slot is free");
        assert!(controller.is_running());
        // second begin is refused while the first is running
        assert!(controller.try_begin(&parent).is_none());

        assert!(controller.cancel());
        assert!(token.is_cancelled());

        controller.finish();
        assert!(!controller.is_running());
        assert!(!controller.cancel());
        assert!(controller.try_begin(&parent).is_some());
    }

    #[test]
    fn test_job_token_is_child_of_shutdown() {
        let controller = JobController::new();
        let parent = CancellationToken::new();
        let token = controller.try_begin(&parent).unwrap();
        parent.cancel();
        assert!(token.is_cancelled());
    }
}
