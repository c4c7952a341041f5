//! Application constants and tunables.

use std::time::Duration;

/// How long a worker sleeps before re-polling an empty queue.
pub const DEFAULT_SLEEP_DURATION: Duration = Duration::from_micros(500);

/// Serialized documents shorter than this are treated as invalid pages and
/// are fatal for the worker that produced them. Deliberately exposed for
/// tuning: the heuristic can reject legitimately small pages.
pub const MIN_PAGE_CONTENT_LEN: usize = 100;

/// Batch size for the exporter's latest-pages pagination.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// File name of the embedded database when no DSN is given.
pub const SQLITE_DB_FILE: &str = "crawler.db";

/// Crawl client request timeout. Store queries time out at 5 s as well;
/// keeping this lower would let the process exit mid-query.
pub const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections the crawl client keeps per host.
pub const MAX_IDLE_CONNS_PER_HOST: usize = 50;

/// Management API listen port.
pub const SERVER_PORT: u16 = 8100;

/// Grace period between the shutdown signal and process exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Default User-Agent header advertised while crawling.
pub fn default_user_agent() -> String {
    format!(
        "pagewatch/v{} - page monitoring crawler",
        env!("CARGO_PKG_VERSION")
    )
}
