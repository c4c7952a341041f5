//! Bulk database-to-disk export of stored page content.
//!
//! Iterates the latest-pages projection in fixed-size batches and writes
//! one HTML file per page under a directory tree mirroring each URL's
//! path. Shares the store's data model and paging discipline with the
//! crawler.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{DEFAULT_PAGE_SIZE, TIMESTAMP_FORMAT};
use crate::storage::{PageContent, Store, StoreError};

// percent-encode the filename but keep the characters common in URL path
// segments readable
const FILENAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const UNSAFE_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', ' '];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not parse stored url: {0}")]
    Url(#[from] url::ParseError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the latest captured page per monitored URL (bounded by `cutoff`)
/// beneath `save_path`. An empty `marked_urls` list exports all monitored
/// URLs. Returns the number of files written; when nothing was written the
/// freshly created output directory is removed again.
pub async fn save_db_content_to_disk(
    store: &Store,
    base_url: &str,
    save_path: &Path,
    cutoff: DateTime<Utc>,
    marked_urls: &[String],
    cancel: &CancellationToken,
) -> Result<u64, ExportError> {
    fs::create_dir_all(save_path)?;
    info!("Saving files to path: {}", save_path.display());

    // run the loop once with an empty pattern when no marked urls given
    let marked: Vec<String> = if marked_urls.is_empty() {
        vec![String::new()]
    } else {
        marked_urls.to_vec()
    };

    let mut files_written = 0u64;

    'marked: for marked_url in &marked {
        let record_count = store
            .pages
            .latest_page_count(base_url, marked_url, cutoff)
            .await?;
        let mut msg = format!("Saving {record_count} records");
        if !marked_url.is_empty() {
            msg.push_str(&format!(" for marked url '{marked_url}'"));
        }
        info!("{msg}");

        let total_pages = (record_count + DEFAULT_PAGE_SIZE - 1) / DEFAULT_PAGE_SIZE;
        for page_num in 1..=total_pages {
            if cancel.is_cancelled() {
                info!("Export cancelled, stopping after {files_written} file(s)");
                break 'marked;
            }
            let contents = store
                .pages
                .latest_pages(base_url, marked_url, cutoff, page_num, DEFAULT_PAGE_SIZE)
                .await?;
            for page_content in &contents {
                write_page_content(page_content, save_path)?;
                files_written += 1;
            }
        }
    }

    if files_written == 0 {
        // nothing exported, drop the directory created above
        if let Err(e) = fs::remove_dir(save_path) {
            warn!("Error removing directory: {e}");
        }
    }

    Ok(files_written)
}

/// Writes one page under `base_path`: the URL path's directories (unsafe
/// characters replaced) lead to `<encoded-last-segment>_<timestamp>.html`.
fn write_page_content(page_content: &PageContent, base_path: &Path) -> Result<PathBuf, ExportError> {
    let parsed = Url::parse(&page_content.url)?;
    let mut segments: Vec<String> = parsed.path().split('/').map(sanitize_segment).collect();

    let file_segment = segments.pop().unwrap_or_default();
    let safe_name = utf8_percent_encode(&file_segment, FILENAME_SAFE).to_string();

    let dir = segments
        .iter()
        .filter(|s| !s.is_empty())
        .fold(base_path.to_path_buf(), |path, seg| path.join(seg));
    fs::create_dir_all(&dir)?;

    let file_path = dir.join(format!(
        "{}_{}.html",
        safe_name,
        page_content.added_at.format(TIMESTAMP_FORMAT)
    ));
    fs::write(&file_path, &page_content.content)?;
    Ok(file_path)
}

/// Replaces characters that are unsafe in file names with `_`.
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if UNSAFE_PATH_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
