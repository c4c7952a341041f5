//! robots.txt fetching and the per-crawl allow policy.
//!
//! The file is fetched once at crawl start with a dedicated short-timeout
//! client, separate from the crawl client so its idle-connection tuning
//! does not bleed into a one-shot request. Following Google's documented
//! policy, HTTP 429 and any 5xx abort the run; every other failure
//! degrades to "allow all". The raw text is cached for the process.

use std::time::Duration;

use log::{info, warn};
use robotstxt::DefaultMatcher;
use thiserror::Error;
use url::Url;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RobotsError {
    /// The host answered 429 or a 5xx; crawling must not proceed.
    #[error("could not get robots.txt, received HTTP status {0}")]
    Refused(u16),

    #[error("could not build robots.txt client: {0}")]
    Client(reqwest::Error),
}

/// Cached robots.txt rules for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    body: String,
}

impl RobotsPolicy {
    /// A policy that allows everything. Used by tests and by fetch
    /// fallbacks.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// From already-fetched robots.txt text.
    pub fn from_body(body: String) -> Self {
        Self { body }
    }

    /// Fetches `<scheme>://<host>/robots.txt` with `user_agent`.
    pub async fn fetch(base_url: &Url, user_agent: &str) -> Result<Self, RobotsError> {
        let robots_url = format!(
            "{}://{}/robots.txt",
            base_url.scheme(),
            base_url.authority()
        );

        let client = reqwest::Client::builder()
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(RobotsError::Client)?;

        let resp = match client.get(&robots_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Could not get robots.txt ({e}), treating as allow-all");
                return Ok(Self::allow_all());
            }
        };

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(RobotsError::Refused(status.as_u16()));
        }
        if !status.is_success() {
            info!("robots.txt returned {status}, treating as allow-all");
            return Ok(Self::allow_all());
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Error while reading robots.txt ({e}), treating as allow-all");
                return Ok(Self::allow_all());
            }
        };

        Ok(Self { body })
    }

    /// Whether `url` may be fetched by `user_agent` under the cached rules.
    pub fn allowed(&self, user_agent: &str, url: &str) -> bool {
        if self.body.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, user_agent, url)
    }
}
