//! Re-queueing stored URLs at crawl start.

use chrono::Utc;
use log::warn;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::CrawlConfig;
use crate::queue::UniqueQueue;
use crate::storage::{Paging, Store, StoreError, UrlFilter, URL_COLUMNS};
use crate::urlutil::contains_any;

const SEED_PAGE_SIZE: i64 = 100;

/// Walks every stored URL of the configured host and decides, per URL,
/// whether it is due for a refetch (queued with the save flag), newly
/// marked (promoted to monitored, then queued), or merely remembered so
/// workers deduplicate against it. Dead URLs and ignore-pattern matches
/// are skipped. In `update_hrefs` mode every alive URL is queued without
/// the save flag to refresh the link graph.
///
/// Returns the number of URLs pushed to the queue.
pub async fn load_urls_to_queue(
    cfg: &CrawlConfig,
    queue: &UniqueQueue,
    store: &Store,
    cancel: &CancellationToken,
) -> Result<u64, StoreError> {
    let interval = cfg.update_interval();
    let now = Utc::now();
    let filter = UrlFilter {
        url: cfg.base.clone(),
        ..UrlFilter::default()
    };

    let mut queued = 0u64;
    let mut page = 1i64;
    loop {
        if cancel.is_cancelled() {
            return Ok(queued);
        }
        let paging = Paging::new(page, SEED_PAGE_SIZE, "id", URL_COLUMNS);
        let (records, _) = store.urls.get_all(&filter, &paging).await?;
        let batch_len = records.len();

        for rec in records {
            let parsed = match Url::parse(&rec.url) {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!("Unable to parse url '{}' from store", rec.url);
                    continue;
                }
            };
            // the substring filter is coarse, only process base-host URLs
            if parsed.host_str() != cfg.base_url.host_str() {
                continue;
            }
            if !rec.is_alive {
                continue;
            }
            if contains_any(parsed.path(), &cfg.ignore_patterns) {
                continue;
            }

            if cfg.update_hrefs {
                queue.insert_force(&rec.url);
                queued += 1;
                continue;
            }

            // a URL with no save yet is immediately due
            let expired = rec
                .last_saved
                .map(|saved| now >= saved + interval)
                .unwrap_or(true);

            if rec.is_monitored && expired {
                queue.insert_force(&rec.url);
                queue.set_flag(&rec.url, true);
                queued += 1;
            } else if !rec.is_monitored && contains_any(&rec.url, &cfg.marked_urls) {
                // marked by this run: promote before fetching
                let mut promoted = rec.clone();
                promoted.is_monitored = true;
                store.urls.update(&mut promoted).await?;
                queue.insert_force(&rec.url);
                queue.set_flag(&rec.url, true);
                queued += 1;
            } else {
                queue.set_flag(&rec.url, false);
            }
        }

        if (batch_len as i64) < SEED_PAGE_SIZE {
            return Ok(queued);
        }
        page += 1;
    }
}
