//! The concurrent crawl engine.
//!
//! N workers are constructed from one shared [`CrawlerConfig`] and run
//! independently; they rendezvous only through the queue and the store.
//! Everything mutable a worker touches (queue, retry counters, invalid-URL
//! cache, cancellation token) is passed in at construction, never reached
//! through globals.

mod seed;
mod worker;

pub use seed::load_urls_to_queue;

use std::sync::Arc;

use dashmap::DashMap;
use log::{error, info};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::CrawlConfig;
use crate::queue::UniqueQueue;
use crate::robots::RobotsPolicy;
use crate::storage::Store;
use crate::urlutil::{is_absolute_url, is_valid_scheme};

/// Worker construction failures.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("crawler: too few crawlers")]
    TooFewCrawlers,

    #[error("crawler: invalid scheme '{0}'. Supported schemes: HTTP, HTTPS")]
    InvalidScheme(String),

    #[error("crawler: base URL should be absolute")]
    BaseUrlNotAbsolute,
}

/// Shared state for every worker of a run.
pub struct CrawlerConfig {
    /// Global work queue.
    pub queue: Arc<UniqueQueue>,
    /// URL / Page models.
    pub store: Arc<Store>,
    /// The run's validated configuration.
    pub config: CrawlConfig,
    /// robots.txt rules fetched once at crawl start.
    pub robots: RobotsPolicy,
    /// Per-URL transport-failure attempts; entry updates are atomic.
    pub failed_requests: DashMap<String, u32>,
    /// URLs already known to fail validation, skipped without re-checking.
    pub invalid_urls: DashMap<String, ()>,
    /// One-shot shutdown signal checked at the top of each iteration.
    pub cancel: CancellationToken,
    /// Optional sink mirroring worker log lines (management API log stream).
    pub log_stream: Option<broadcast::Sender<String>>,
}

/// A single crawl worker. Owns nothing but its name; all state is shared.
pub struct Crawler {
    pub(crate) name: String,
    pub(crate) shared: Arc<CrawlerConfig>,
}

impl Crawler {
    pub fn new(name: impl Into<String>, shared: Arc<CrawlerConfig>) -> Result<Self, CrawlerError> {
        validate_shared(&shared)?;
        Ok(Self {
            name: name.into(),
            shared,
        })
    }

    pub(crate) fn info(&self, msg: &str) {
        let line = format!("{}: {}", self.name, msg);
        info!("{line}");
        self.forward(line);
    }

    pub(crate) fn error(&self, msg: &str) {
        let line = format!("{}: {}", self.name, msg);
        error!("{line}");
        self.forward(line);
    }

    fn forward(&self, line: String) {
        if let Some(tx) = &self.shared.log_stream {
            // nobody listening is fine
            let _ = tx.send(line);
        }
    }
}

/// Builds `n` workers named `<prefix>#001..` from one shared config.
pub fn n_new_crawlers(
    n: usize,
    name_prefix: &str,
    shared: Arc<CrawlerConfig>,
) -> Result<Vec<Crawler>, CrawlerError> {
    if n < 1 {
        return Err(CrawlerError::TooFewCrawlers);
    }
    validate_shared(&shared)?;
    Ok((1..=n)
        .map(|i| Crawler {
            name: format!("{name_prefix}#{i:03}"),
            shared: Arc::clone(&shared),
        })
        .collect())
}

fn validate_shared(shared: &CrawlerConfig) -> Result<(), CrawlerError> {
    let scheme = shared.config.base_url.scheme();
    if !is_valid_scheme(scheme) {
        return Err(CrawlerError::InvalidScheme(scheme.to_string()));
    }
    if !is_absolute_url(&shared.config.base) {
        return Err(CrawlerError::BaseUrlNotAbsolute);
    }
    Ok(())
}
