//! The per-worker crawl loop.
//!
//! Each iteration pops one URL, fetches it, discovers embedded links,
//! classifies the URL and persists either a full page snapshot or just a
//! last-checked stamp. Fatal events end the worker by returning from
//! [`Crawler::crawl`]; sibling workers keep running.

use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use super::Crawler;
use crate::config::{DEFAULT_SLEEP_DURATION, MIN_PAGE_CONTENT_LEN};
use crate::storage::{PageRecord, StoreError, UrlRecord};
use crate::urlutil::{contains_any, is_valid_scheme, normalize_href};

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("'a' is a valid selector"));

/// Errors that are fatal for the worker that hit them.
#[derive(Debug, Error)]
enum WorkerError {
    #[error("empty/no content. url: '{url}'; len: {len}")]
    ContentTooShort { url: String, len: usize },

    #[error("could not get URL '{url}' from store: {source}")]
    LoadUrl { url: String, source: StoreError },

    #[error("could not insert page for url '{url}': {source}")]
    InsertPage { url: String, source: StoreError },

    #[error("could not update URL '{url}': {source}")]
    UpdateUrl { url: String, source: StoreError },
}

struct ParsedPage {
    hrefs: Vec<String>,
    html: String,
}

/// Extracts `<a href>` values and the re-serialized document in one sync
/// scope: `scraper::Html` is not `Send` and must not live across an await.
fn parse_page(body: &str) -> ParsedPage {
    let document = Html::parse_document(body);
    let hrefs = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect();
    ParsedPage {
        hrefs,
        html: document.root_element().html(),
    }
}

impl Crawler {
    /// Runs the worker until cancellation, idle timeout or a fatal event.
    pub async fn crawl(&self, client: &reqwest::Client) {
        let mut idle_since = Instant::now();

        loop {
            if self.shared.cancel.is_cancelled() {
                self.info("Termination signal received. Shutting down");
                return;
            }

            let urlpath = match self.shared.queue.remove() {
                Ok(url) => url,
                Err(_) => {
                    if idle_since.elapsed() > self.shared.config.idle_timeout {
                        self.info("Queue is empty, quitting");
                        return;
                    }
                    tokio::time::sleep(DEFAULT_SLEEP_DURATION).await;
                    continue;
                }
            };

            let resp = match client.get(&urlpath).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    self.info(&format!("Error in GET request: {e} for url: '{urlpath}'"));
                    self.maybe_requeue(&urlpath);
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                if !self.mark_url_dead(&urlpath).await {
                    return;
                }
                continue;
            }
            if status != StatusCode::OK {
                self.info(&format!(
                    "Invalid HTTP status code received {} for url: '{urlpath}'",
                    status.as_u16()
                ));
                continue;
            }

            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    self.info(&format!("Could not read response body: {e}"));
                    continue;
                }
            };

            let page = parse_page(&body);

            // discovery: every href not seen before goes to queue and store
            for href in &page.hrefs {
                let Some(href) = normalize_href(href, &self.shared.config.base) else {
                    continue;
                };
                if self.shared.invalid_urls.contains_key(&href) {
                    continue;
                }
                if !self.is_valid_url(&href) {
                    self.info(&format!("Invalid url: {href}"));
                    self.shared.invalid_urls.insert(href, ());
                    continue;
                }
                if self.shared.queue.insert(&href) {
                    self.info(&format!("Added url '{href}' to queue"));
                    let mut rec = UrlRecord::new(href.clone(), self.is_marked(&href));
                    if let Err(e) = self.shared.store.urls.insert(&mut rec).await {
                        self.error(&format!("FATAL: Failed to insert url '{href}' to store: {e}"));
                        return;
                    }
                    if rec.is_monitored {
                        self.shared.queue.set_flag(&href, true);
                    }
                }
            }

            // classify: the membership entry must exist, the URL came off
            // this very queue
            let save_content = match self.shared.queue.flag(&urlpath) {
                Ok(flagged) => self.is_marked(&urlpath) || flagged,
                Err(_) => {
                    self.error(&format!(
                        "FATAL: URL not found in queue map '{urlpath}'. Quitting"
                    ));
                    return;
                }
            };

            if save_content {
                if let Err(e) = self.save_page_content(&urlpath, page.html).await {
                    self.error(&format!("FATAL: {e}"));
                    return;
                }
                self.info(&format!("Saved content of url '{urlpath}'"));
                self.shared.queue.set_flag(&urlpath, false);
            } else if let Err(e) = self.update_last_checked(&urlpath).await {
                self.error(&format!("FATAL: {e}"));
                return;
            }

            tokio::time::sleep(self.shared.config.request_delay).await;
            idle_since = Instant::now();
        }
    }

    /// Saves the serialized document as a new page snapshot and stamps the
    /// URL row. Content below the minimum length is fatal.
    async fn save_page_content(&self, urlpath: &str, html: String) -> Result<(), WorkerError> {
        if html.len() < MIN_PAGE_CONTENT_LEN {
            return Err(WorkerError::ContentTooShort {
                url: urlpath.to_string(),
                len: html.len(),
            });
        }

        // the row exists: every queued URL was inserted on discovery
        let rec = self
            .shared
            .store
            .urls
            .get_by_url(urlpath)
            .await
            .map_err(|source| WorkerError::LoadUrl {
                url: urlpath.to_string(),
                source,
            })?;

        let mut page = PageRecord::new(rec.id, html);
        self.shared
            .store
            .pages
            .insert(&mut page)
            .await
            .map_err(|source| WorkerError::InsertPage {
                url: urlpath.to_string(),
                source,
            })?;

        self.update_with_retry(rec, |r| {
            let now = Utc::now();
            r.last_checked = Some(now);
            r.last_saved = Some(now);
        })
        .await
        .map_err(|source| WorkerError::UpdateUrl {
            url: urlpath.to_string(),
            source,
        })
    }

    /// Stamps `last_checked` on a URL that was visited without a content
    /// save.
    async fn update_last_checked(&self, urlpath: &str) -> Result<(), WorkerError> {
        let rec = self
            .shared
            .store
            .urls
            .get_by_url(urlpath)
            .await
            .map_err(|source| WorkerError::LoadUrl {
                url: urlpath.to_string(),
                source,
            })?;
        self.update_with_retry(rec, |r| {
            r.last_checked = Some(Utc::now());
        })
        .await
        .map_err(|source| WorkerError::UpdateUrl {
            url: urlpath.to_string(),
            source,
        })
    }

    /// Marks a 404 URL dead. Returns false when the failure is fatal for
    /// this worker; an edit conflict that survives one retry is only
    /// logged, the next pass will see the URL again.
    async fn mark_url_dead(&self, urlpath: &str) -> bool {
        self.info(&format!("Dead url (404): '{urlpath}'"));
        let rec = match self.shared.store.urls.get_by_url(urlpath).await {
            Ok(rec) => rec,
            Err(e) => {
                self.error(&format!(
                    "FATAL: could not get URL '{urlpath}' from store: {e}"
                ));
                return false;
            }
        };
        match self
            .update_with_retry(rec, |r| {
                r.is_alive = false;
                r.last_checked = Some(Utc::now());
            })
            .await
        {
            Ok(()) => true,
            Err(StoreError::EditConflict) => {
                self.info(&format!(
                    "Edit conflict while marking '{urlpath}' dead, leaving it for the next pass"
                ));
                true
            }
            Err(e) => {
                self.error(&format!("FATAL: could not update URL '{urlpath}': {e}"));
                false
            }
        }
    }

    /// Applies `apply` to the row and updates it; on an edit conflict the
    /// row is re-read and the update retried once.
    async fn update_with_retry<F>(&self, mut rec: UrlRecord, apply: F) -> Result<(), StoreError>
    where
        F: Fn(&mut UrlRecord),
    {
        apply(&mut rec);
        match self.shared.store.urls.update(&mut rec).await {
            Err(StoreError::EditConflict) => {
                let mut fresh = self.shared.store.urls.get_by_url(&rec.url).await?;
                apply(&mut fresh);
                self.shared.store.urls.update(&mut fresh).await
            }
            other => other,
        }
    }

    /// Puts a transport-failed URL back on the queue while its retry budget
    /// lasts.
    fn maybe_requeue(&self, urlpath: &str) {
        if self.shared.config.retry_times == 0 {
            return;
        }
        let mut attempts = self
            .shared
            .failed_requests
            .entry(urlpath.to_string())
            .or_insert(0);
        if *attempts < self.shared.config.retry_times {
            *attempts += 1;
            let attempt = *attempts;
            drop(attempts);
            self.shared.queue.insert_force(urlpath);
            self.info(&format!(
                "Requeued url '{urlpath}' (attempt {attempt}/{})",
                self.shared.config.retry_times
            ));
        }
    }

    /// A URL is valid when it parses, stays on the base host, has an
    /// http(s) scheme, dodges every ignore pattern and is allowed by
    /// robots.txt.
    fn is_valid_url(&self, href: &str) -> bool {
        if href.is_empty() {
            return false;
        }
        let parsed = match Url::parse(href) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        if parsed.host_str().is_some()
            && parsed.host_str() != self.shared.config.base_url.host_str()
        {
            return false;
        }
        if !is_valid_scheme(parsed.scheme()) {
            return false;
        }
        if contains_any(parsed.path(), &self.shared.config.ignore_patterns) {
            return false;
        }
        if !self
            .shared
            .robots
            .allowed(&self.shared.config.user_agent, href)
        {
            self.info(&format!("Not allowed by robots.txt: {href}"));
            return false;
        }
        true
    }

    /// Whether any non-empty marked path is a substring of `href`.
    fn is_marked(&self, href: &str) -> bool {
        contains_any(href, &self.shared.config.marked_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::shared_config;
    use crate::crawler::{Crawler, CrawlerConfig};
    use crate::storage::Store;
    use std::sync::Arc;

    async fn test_crawler(base: &str) -> (Crawler, Arc<CrawlerConfig>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.db");
        let store = Arc::new(Store::connect("", path.to_str().unwrap()).await.unwrap());
        let shared = shared_config(base, store).await;
        let crawler = Crawler::new("crawler#001", Arc::clone(&shared)).unwrap();
        (crawler, shared, dir)
    }

    #[test]
    fn test_parse_page_extracts_hrefs() {
        let body = r#"<html><body>
            <a href="/a">a</a>
            <a href="/a">again</a>
            <a href="https://h.example/b">b</a>
            <a>no href</a>
        </body></html>"#;
        let page = parse_page(body);
        assert_eq!(page.hrefs, ["/a", "/a", "https://h.example/b"]);
        assert!(page.html.contains("<html>"));
    }

    #[test]
    fn test_parse_page_is_idempotent() {
        let body = r#"<html><body><a href="/x">x</a><a href="y">y</a></body></html>"#;
        let first = parse_page(body);
        let second = parse_page(body);
        assert_eq!(first.hrefs, second.hrefs);
        assert_eq!(first.html, second.html);
    }

    #[tokio::test]
    async fn test_is_valid_url_host_scope() {
        let (crawler, _shared, _dir) = test_crawler("https://h.example").await;
        assert!(crawler.is_valid_url("https://h.example/a"));
        assert!(!crawler.is_valid_url("https://other.example/c"));
        assert!(!crawler.is_valid_url("ftp://h.example/a"));
        assert!(!crawler.is_valid_url("mailto:x@h.example"));
        assert!(!crawler.is_valid_url(""));
        assert!(!crawler.is_valid_url("#frag"));
    }

    #[tokio::test]
    async fn test_is_valid_url_ignore_patterns() {
        let (crawler, shared, _dir) = test_crawler("https://h.example").await;
        // patterns match the path, not the host
        assert!(crawler.is_valid_url("https://h.example/admin/login"));
        drop(crawler);
        let mut shared = Arc::into_inner(shared).expect("sole owner");
        shared.config.ignore_patterns = vec!["/admin".to_string()];
        let shared = Arc::new(shared);
        let crawler = Crawler::new("crawler#001", shared).unwrap();
        assert!(!crawler.is_valid_url("https://h.example/admin/login"));
        assert!(crawler.is_valid_url("https://h.example/public"));
    }

    #[tokio::test]
    async fn test_maybe_requeue_respects_budget() {
        let (crawler, shared, _dir) = test_crawler("https://h.example").await;
        let url = "https://h.example/flaky";
        crawler.maybe_requeue(url);
        crawler.maybe_requeue(url);
        assert_eq!(shared.queue.len(), 2);
        // budget of 2 exhausted, third failure is dropped
        crawler.maybe_requeue(url);
        assert_eq!(shared.queue.len(), 2);
    }

    #[tokio::test]
    async fn test_maybe_requeue_disabled_when_retry_zero() {
        let (crawler, shared, _dir) = test_crawler("https://h.example").await;
        drop(crawler);
        let mut cfg = Arc::into_inner(shared).expect("sole owner");
        cfg.config.retry_times = 0;
        let shared = Arc::new(cfg);
        let crawler = Crawler::new("crawler#001", Arc::clone(&shared)).unwrap();
        crawler.maybe_requeue("https://h.example/flaky");
        assert!(shared.queue.is_empty());
        assert!(shared.failed_requests.is_empty());
    }

    #[tokio::test]
    async fn test_save_page_content_rejects_short_content() {
        let (crawler, _shared, _dir) = test_crawler("https://h.example").await;
        let err = crawler
            .save_page_content("https://h.example/a", "<html></html>".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ContentTooShort { len: 13, .. }));
    }

    #[tokio::test]
    async fn test_save_page_content_round_trip() {
        let (crawler, shared, _dir) = test_crawler("https://h.example").await;
        let url = "https://h.example/m";
        let mut rec = UrlRecord::new(url.to_string(), true);
        shared.store.urls.insert(&mut rec).await.unwrap();

        let html = format!("<html><body>{}</body></html>", "x".repeat(200));
        crawler.save_page_content(url, html.clone()).await.unwrap();

        let stored = shared.store.urls.get_by_url(url).await.unwrap();
        assert!(stored.last_checked.is_some());
        assert!(stored.last_saved.is_some());
        assert!(stored.last_saved.unwrap() <= stored.last_checked.unwrap());
        assert_eq!(stored.version, rec.version + 1);

        let paging = crate::storage::Paging::new(1, 10, "id", crate::storage::PAGE_COLUMNS);
        let (pages, _) = shared
            .store
            .pages
            .get_all_by_url(stored.id, &paging)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content, html);
    }

    #[tokio::test]
    async fn test_update_with_retry_survives_one_conflict() {
        let (crawler, shared, _dir) = test_crawler("https://h.example").await;
        let url = "https://h.example/c";
        let mut rec = UrlRecord::new(url.to_string(), false);
        shared.store.urls.insert(&mut rec).await.unwrap();

        // another worker wins the first round: bump the stored version
        let mut other = shared.store.urls.get_by_url(url).await.unwrap();
        shared.store.urls.update(&mut other).await.unwrap();

        // rec still carries the stale version; the helper re-reads
        crawler
            .update_with_retry(rec, |r| r.last_checked = Some(Utc::now()))
            .await
            .unwrap();

        let stored = shared.store.urls.get_by_url(url).await.unwrap();
        assert!(stored.last_checked.is_some());
    }
}
