//! Library-level crawl configuration (no CLI dependencies).

use std::time::Duration;

use url::Url;

use crate::urlutil::{is_absolute_url, is_valid_scheme};
use crate::validation::Validator;

/// Configuration for one crawl run. Built from the CLI flags or from a
/// management API request; validated with [`CrawlConfig::validate`] before
/// any work starts.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Parsed base URL; host scope of the crawl.
    pub base_url: Url,
    /// Canonical base URL string: trimmed, no trailing `/`, lowercased.
    /// Used for queue membership and href joining.
    pub base: String,
    /// Number of worker tasks.
    pub workers: usize,
    /// Worker exit after this long with an empty queue.
    pub idle_timeout: Duration,
    /// Politeness floor between two successful iterations.
    pub request_delay: Duration,
    /// Retries per URL on transport error.
    pub retry_times: u32,
    /// Days after `last_saved` when a monitored URL is due again.
    pub update_days: u32,
    /// User-Agent header, also used for robots.txt matching.
    pub user_agent: String,
    /// URL substrings whose pages are captured.
    pub marked_urls: Vec<String>,
    /// URL path substrings excluded from the crawl.
    pub ignore_patterns: Vec<String>,
    /// Re-queue every alive URL regardless of expiry, without saving content.
    pub update_hrefs: bool,
}

impl CrawlConfig {
    /// Boundary validation; failures accumulate into `v` keyed by flag name.
    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.base.is_empty(), "baseurl", "must be provided");
        v.check(
            is_absolute_url(&self.base),
            "baseurl",
            "must be absolute URL",
        );
        v.check(
            is_valid_scheme(self.base_url.scheme()),
            "baseurl",
            "scheme must be http/https",
        );
        v.check(self.workers >= 1, "n", "must be at least 1");
        v.check(!self.user_agent.is_empty(), "ua", "must be provided");
        v.check(
            self.request_delay >= Duration::from_millis(1),
            "req-delay",
            "cannot be less than 1ms",
        );
        v.check(
            self.idle_timeout >= Duration::from_secs(1),
            "idle-time",
            "cannot be less than 1s",
        );
    }

    /// The refresh interval derived from `update_days`.
    pub fn update_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.update_days) * 24)
    }
}

/// Validates a DSN: empty selects the embedded database, anything else must
/// be a postgres DSN.
pub fn validate_dsn(v: &mut Validator, dsn: &str) {
    v.check(
        dsn.is_empty() || dsn.starts_with("postgres"),
        "db-dsn",
        "only postgres dsn are supported, when empty crawler will use the embedded sqlite database",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urlutil::parse_base_url;

    fn config(base: &str) -> CrawlConfig {
        let (base_url, base) = parse_base_url(base).unwrap();
        CrawlConfig {
            base_url,
            base,
            workers: 10,
            idle_timeout: Duration::from_secs(10),
            request_delay: Duration::from_millis(50),
            retry_times: 2,
            update_days: 1,
            user_agent: "testbot/1.0".to_string(),
            marked_urls: vec![],
            ignore_patterns: vec![],
            update_hrefs: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let mut v = Validator::new();
        config("https://h.example/").validate(&mut v);
        assert!(v.is_valid(), "unexpected errors: {:?}", v.errors());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let mut v = Validator::new();
        config("ftp://h.example").validate(&mut v);
        assert!(v.errors().contains_key("baseurl"));
    }

    #[test]
    fn test_rejects_small_delays() {
        let mut v = Validator::new();
        let mut cfg = config("https://h.example");
        cfg.request_delay = Duration::from_micros(10);
        cfg.idle_timeout = Duration::from_millis(100);
        cfg.validate(&mut v);
        assert!(v.errors().contains_key("req-delay"));
        assert!(v.errors().contains_key("idle-time"));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut v = Validator::new();
        let mut cfg = config("https://h.example");
        cfg.workers = 0;
        cfg.validate(&mut v);
        assert!(v.errors().contains_key("n"));
    }

    #[test]
    fn test_validate_dsn() {
        let mut v = Validator::new();
        validate_dsn(&mut v, "");
        validate_dsn(&mut v, "postgres://u:p@localhost/db");
        assert!(v.is_valid());
        validate_dsn(&mut v, "mysql://nope");
        assert!(v.errors().contains_key("db-dsn"));
    }
}
