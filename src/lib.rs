//! pagewatch: a polite, resumable, single-host web crawler.
//!
//! Given an absolute base URL, pagewatch visits pages reachable from it,
//! discovers embedded hyperlinks, and persists either full rendered HTML
//! (for URLs marked for monitoring) or just a last-checked timestamp.
//! Crawl state is durable: stopping and restarting continues where the
//! previous run left off, and monitored pages are re-captured once their
//! refresh interval has passed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagewatch::{run_crawl, CrawlConfig, Store};
//! use pagewatch::urlutil::parse_base_url;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (base_url, base) = parse_base_url("https://h.example")?;
//! let cfg = CrawlConfig {
//!     base_url,
//!     base,
//!     workers: 10,
//!     idle_timeout: std::time::Duration::from_secs(10),
//!     request_delay: std::time::Duration::from_millis(50),
//!     retry_times: 2,
//!     update_days: 1,
//!     user_agent: "mybot/1.0".into(),
//!     marked_urls: vec!["/docs".into()],
//!     ignore_patterns: vec![],
//!     update_hrefs: false,
//! };
//! let store = Arc::new(Store::connect("", "crawler.db").await?);
//! let report = run_crawl(cfg, store, CancellationToken::new(), None).await?;
//! println!("loaded {} URLs from a previous run", report.loaded_from_store);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod export;
pub mod logging;
pub mod queue;
pub mod robots;
pub mod run;
pub mod server;
pub mod storage;
pub mod urlutil;
pub mod validation;

pub use config::CrawlConfig;
pub use run::{run_crawl, CrawlError, CrawlReport};
pub use storage::Store;
