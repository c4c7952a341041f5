//! The `pages` table: insert-only snapshots plus the latest-pages
//! projection the disk exporter consumes.

use chrono::{DateTime, Utc};
use sqlx::AnyPool;
use sqlx::Row;

use super::filters::{Metadata, Paging};
use super::models::{PageContent, PageRecord};
use super::{with_deadline, Dialect, StoreError};

const QUERY_GET_PAGE_BY_ID: &str =
    "SELECT id, url_id, added_at, content FROM pages WHERE id = __ARG__";

const QUERY_INSERT_PAGE: &str = "INSERT INTO pages (url_id, added_at, content) \
     VALUES (__ARG__, __ARG__, __ARG__) RETURNING id";

const QUERY_DELETE_PAGE: &str = "DELETE FROM pages WHERE id = __ARG__";

// The latest snapshot per URL, bounded by a cutoff: rows are partitioned by
// URL and ranked by added_at descending, keeping row number 1. Restricted
// to monitored URLs under the base URL that contain the marked substring.
const QUERY_LATEST_PAGES_COUNT: &str = "WITH latest_pages AS (
        SELECT u.url, p.id, p.added_at,
            ROW_NUMBER() OVER (PARTITION BY u.id ORDER BY p.added_at DESC) AS rn
        FROM pages p
        JOIN urls u ON p.url_id = u.id
        WHERE u.is_monitored = 1 AND u.url LIKE __ARG__ || '%'
          AND u.url LIKE '%' || __ARG__ || '%'
          AND p.added_at <= __ARG__
    )
    SELECT COUNT(*) AS record_count FROM latest_pages WHERE rn = 1";

const QUERY_LATEST_PAGES_PAGINATED: &str = "WITH latest_pages AS (
        SELECT u.url, p.added_at, p.content,
            ROW_NUMBER() OVER (PARTITION BY u.id ORDER BY p.added_at DESC) AS rn
        FROM pages p
        JOIN urls u ON p.url_id = u.id
        WHERE u.is_monitored = 1 AND u.url LIKE __ARG__ || '%'
          AND u.url LIKE '%' || __ARG__ || '%'
          AND p.added_at <= __ARG__
    )
    SELECT url, added_at, content FROM latest_pages WHERE rn = 1
    ORDER BY url LIMIT __ARG__ OFFSET __ARG__";

/// Model over the `pages` table.
#[derive(Clone)]
pub struct PageStore {
    pub(crate) reader: AnyPool,
    pub(crate) writer: AnyPool,
    pub(crate) dialect: Dialect,
}

impl PageStore {
    /// Fetches a page snapshot by id.
    pub async fn get_by_id(&self, id: i64) -> Result<PageRecord, StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        let query = self.dialect.rewrite(QUERY_GET_PAGE_BY_ID);
        let row = with_deadline(sqlx::query(&query).bind(id).fetch_optional(&self.reader))
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        PageRecord::from_row(&row)
    }

    /// Lists snapshots of one URL, paginated.
    pub async fn get_all_by_url(
        &self,
        url_id: i64,
        paging: &Paging,
    ) -> Result<(Vec<PageRecord>, Metadata), StoreError> {
        if url_id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        let mut query = "SELECT id, url_id, added_at, content, count(*) OVER() AS total_records \
             FROM pages WHERE url_id = __ARG__"
            .to_string();
        query.push_str(&paging.order_by()?);
        query.push_str(" LIMIT __ARG__ OFFSET __ARG__");

        let query = self.dialect.rewrite(&query);
        let rows = with_deadline(
            sqlx::query(&query)
                .bind(url_id)
                .bind(paging.limit())
                .bind(paging.offset())
                .fetch_all(&self.reader),
        )
        .await?;
        let total: i64 = match rows.first() {
            Some(row) => row.try_get("total_records")?,
            None => 0,
        };
        let pages = rows
            .iter()
            .map(PageRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((pages, Metadata::calculate(total, paging.page, paging.page_size)))
    }

    /// Inserts a snapshot; the store-assigned id is written back into `rec`.
    pub async fn insert(&self, rec: &mut PageRecord) -> Result<(), StoreError> {
        let query = self.dialect.rewrite(QUERY_INSERT_PAGE);
        let row = with_deadline(
            sqlx::query(&query)
                .bind(rec.url_id)
                .bind(rec.added_at.timestamp_millis())
                .bind(rec.content.as_str())
                .fetch_one(&self.writer),
        )
        .await?;
        rec.id = row.try_get("id")?;
        Ok(())
    }

    /// Deletes a snapshot by id.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        let query = self.dialect.rewrite(QUERY_DELETE_PAGE);
        let result = with_deadline(sqlx::query(&query).bind(id).execute(&self.writer)).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    /// Counts the latest-page projection for `base_url` / `marked` up to
    /// `cutoff`.
    pub async fn latest_page_count(
        &self,
        base_url: &str,
        marked: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let query = self.dialect.rewrite(QUERY_LATEST_PAGES_COUNT);
        let row = with_deadline(
            sqlx::query(&query)
                .bind(base_url)
                .bind(marked)
                .bind(cutoff.timestamp_millis())
                .fetch_one(&self.reader),
        )
        .await?;
        Ok(row.try_get("record_count")?)
    }

    /// One page of the latest-page projection, `page` starting at 1.
    pub async fn latest_pages(
        &self,
        base_url: &str,
        marked: &str,
        cutoff: DateTime<Utc>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<PageContent>, StoreError> {
        let query = self.dialect.rewrite(QUERY_LATEST_PAGES_PAGINATED);
        let rows = with_deadline(
            sqlx::query(&query)
                .bind(base_url)
                .bind(marked)
                .bind(cutoff.timestamp_millis())
                .bind(page_size)
                .bind((page - 1) * page_size)
                .fetch_all(&self.reader),
        )
        .await?;
        rows.iter().map(PageContent::from_row).collect()
    }
}
