//! Crawl coordination: wiring, worker spawn, shutdown.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{CrawlConfig, HTTP_CLIENT_TIMEOUT, MAX_IDLE_CONNS_PER_HOST};
use crate::crawler::{load_urls_to_queue, n_new_crawlers, CrawlerConfig, CrawlerError};
use crate::queue::UniqueQueue;
use crate::robots::{RobotsError, RobotsPolicy};
use crate::storage::{Store, StoreError, UrlRecord};

/// Failures while setting up or running a crawl. Worker construction gets
/// its own variant so the CLI can exit with a distinct code.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Workers(#[from] CrawlerError),

    #[error(transparent)]
    Robots(#[from] RobotsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Summary of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// URLs re-queued from the store before workers started.
    pub loaded_from_store: u64,
    /// Workers spawned.
    pub workers: usize,
    pub elapsed_seconds: f64,
}

/// Runs one crawl to completion.
///
/// Seeds the queue with the base URL, re-queues stored URLs that are due,
/// fetches robots.txt, spawns the workers and waits for all of them to
/// exit. Cancelling `cancel` clears the queue so in-flight discoveries
/// stop reintroducing work, then lets the workers drain.
pub async fn run_crawl(
    cfg: CrawlConfig,
    store: Arc<Store>,
    cancel: CancellationToken,
    log_stream: Option<broadcast::Sender<String>>,
) -> Result<CrawlReport, CrawlError> {
    let started = Instant::now();

    let queue = Arc::new(UniqueQueue::new());
    queue.insert(&cfg.base);

    // a previous run may have created the base row already; the unique
    // index makes that a no-op
    let mut base_rec = UrlRecord::new(cfg.base.clone(), false);
    match store.urls.insert(&mut base_rec).await {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {}
        Err(e) => return Err(e.into()),
    }

    let robots = RobotsPolicy::fetch(&cfg.base_url, &cfg.user_agent).await?;

    let loaded_from_store = load_urls_to_queue(&cfg, &queue, &store, &cancel).await?;
    info!("Loaded {loaded_from_store} URLs from store");

    let client = reqwest::Client::builder()
        .timeout(HTTP_CLIENT_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .user_agent(cfg.user_agent.clone())
        .build()?;

    let workers = cfg.workers;
    let shared = Arc::new(CrawlerConfig {
        queue: Arc::clone(&queue),
        store: Arc::clone(&store),
        config: cfg,
        robots,
        failed_requests: DashMap::new(),
        invalid_urls: DashMap::new(),
        cancel: cancel.clone(),
        log_stream,
    });

    let crawlers = n_new_crawlers(workers, "crawler", Arc::clone(&shared))?;

    // clear pending work the moment cancellation lands
    let sweeper = tokio::spawn({
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            queue.clear();
        }
    });

    let mut handles = Vec::with_capacity(crawlers.len());
    for crawler in crawlers {
        let client = client.clone();
        handles.push(tokio::spawn(async move { crawler.crawl(&client).await }));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Crawler task panicked: {e:?}");
        }
    }
    sweeper.abort();

    Ok(CrawlReport {
        loaded_from_store,
        workers,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    })
}

impl CrawlError {
    /// Process exit code for this failure: worker construction failures are
    /// distinguished from configuration/runtime faults.
    pub fn exit_code(&self) -> i32 {
        match self {
            CrawlError::Workers(_) => 2,
            _ => 1,
        }
    }
}
