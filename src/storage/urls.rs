//! The `urls` table: typed CRUD with optimistic concurrency.

use sqlx::AnyPool;
use sqlx::Row;

use super::filters::{Metadata, Paging, UrlFilter};
use super::models::{bool_to_int, opt_datetime_to_millis, UrlRecord};
use super::{with_deadline, Dialect, StoreError};

const QUERY_GET_URL_BY_ID: &str = "SELECT id, url, first_encountered, last_checked, last_saved, \
     is_monitored, is_alive, version FROM urls WHERE id = __ARG__";

const QUERY_GET_URL_BY_URL: &str = "SELECT id, url, first_encountered, last_checked, last_saved, \
     is_monitored, is_alive, version FROM urls WHERE url = __ARG__";

const QUERY_INSERT_URL: &str = "INSERT INTO urls \
     (url, first_encountered, last_checked, last_saved, is_monitored, is_alive) \
     VALUES (__ARG__, __ARG__, __ARG__, __ARG__, __ARG__, __ARG__) \
     RETURNING id, version";

const QUERY_UPDATE_URL: &str = "UPDATE urls \
     SET last_checked = __ARG__, last_saved = __ARG__, is_monitored = __ARG__, \
         is_alive = __ARG__, version = version + 1 \
     WHERE id = __ARG__ AND version = __ARG__ \
     RETURNING version";

const QUERY_DELETE_URL: &str = "DELETE FROM urls WHERE id = __ARG__";

/// Model over the `urls` table.
#[derive(Clone)]
pub struct UrlStore {
    pub(crate) reader: AnyPool,
    pub(crate) writer: AnyPool,
    pub(crate) dialect: Dialect,
}

impl UrlStore {
    /// Fetches a URL row by id.
    pub async fn get_by_id(&self, id: i64) -> Result<UrlRecord, StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        let query = self.dialect.rewrite(QUERY_GET_URL_BY_ID);
        let row = with_deadline(sqlx::query(&query).bind(id).fetch_optional(&self.reader))
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        UrlRecord::from_row(&row)
    }

    /// Fetches a URL row by its url string.
    pub async fn get_by_url(&self, url: &str) -> Result<UrlRecord, StoreError> {
        if url.is_empty() {
            return Err(StoreError::NullUrl);
        }
        let query = self.dialect.rewrite(QUERY_GET_URL_BY_URL);
        let row = with_deadline(sqlx::query(&query).bind(url).fetch_optional(&self.reader))
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        UrlRecord::from_row(&row)
    }

    /// Inserts a new URL row; the store-assigned id and version are written
    /// back into `rec`.
    pub async fn insert(&self, rec: &mut UrlRecord) -> Result<(), StoreError> {
        if rec.url.is_empty() {
            return Err(StoreError::NullUrl);
        }
        let query = self.dialect.rewrite(QUERY_INSERT_URL);
        let row = with_deadline(
            sqlx::query(&query)
                .bind(rec.url.as_str())
                .bind(rec.first_encountered.timestamp_millis())
                .bind(opt_datetime_to_millis(rec.last_checked))
                .bind(opt_datetime_to_millis(rec.last_saved))
                .bind(bool_to_int(rec.is_monitored))
                .bind(bool_to_int(rec.is_alive))
                .fetch_one(&self.writer),
        )
        .await?;
        rec.id = row.try_get("id")?;
        rec.version = row.try_get("version")?;
        Ok(())
    }

    /// Updates a URL row under optimistic locking: when the stored version
    /// no longer matches `rec.version` the call fails with `EditConflict`
    /// and the row is left unchanged. On success the incremented version is
    /// written back into `rec`.
    pub async fn update(&self, rec: &mut UrlRecord) -> Result<(), StoreError> {
        let query = self.dialect.rewrite(QUERY_UPDATE_URL);
        let row = with_deadline(
            sqlx::query(&query)
                .bind(opt_datetime_to_millis(rec.last_checked))
                .bind(opt_datetime_to_millis(rec.last_saved))
                .bind(bool_to_int(rec.is_monitored))
                .bind(bool_to_int(rec.is_alive))
                .bind(rec.id)
                .bind(rec.version)
                .fetch_optional(&self.writer),
        )
        .await?
        .ok_or(StoreError::EditConflict)?;
        rec.version = row.try_get("version")?;
        Ok(())
    }

    /// Deletes a URL row by id; pages cascade.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        let query = self.dialect.rewrite(QUERY_DELETE_URL);
        let result = with_deadline(sqlx::query(&query).bind(id).execute(&self.writer)).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    /// Lists URL rows matching `filter`, paginated. Returns the page of
    /// rows together with paging metadata.
    pub async fn get_all(
        &self,
        filter: &UrlFilter,
        paging: &Paging,
    ) -> Result<(Vec<UrlRecord>, Metadata), StoreError> {
        let mut query = "SELECT id, url, first_encountered, last_checked, last_saved, \
             is_monitored, is_alive, version, count(*) OVER() AS total_records \
             FROM urls WHERE url LIKE __ARG__"
            .to_string();
        let pattern = format!("%{}%", filter.url);
        let mut flag_args: Vec<i64> = Vec::new();
        if let Some(is_alive) = filter.is_alive {
            query.push_str(" AND is_alive = __ARG__");
            flag_args.push(bool_to_int(is_alive));
        }
        if let Some(is_monitored) = filter.is_monitored {
            query.push_str(" AND is_monitored = __ARG__");
            flag_args.push(bool_to_int(is_monitored));
        }
        query.push_str(&paging.order_by()?);
        query.push_str(" LIMIT __ARG__ OFFSET __ARG__");

        let query = self.dialect.rewrite(&query);
        let mut q = sqlx::query(&query).bind(pattern);
        for arg in flag_args {
            q = q.bind(arg);
        }
        q = q.bind(paging.limit()).bind(paging.offset());

        let rows = with_deadline(q.fetch_all(&self.reader)).await?;
        let total: i64 = match rows.first() {
            Some(row) => row.try_get("total_records")?,
            None => 0,
        };
        let urls = rows
            .iter()
            .map(UrlRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((urls, Metadata::calculate(total, paging.page, paging.page_size)))
    }

    /// Lists monitored, alive URL rows, paginated.
    pub async fn get_all_monitored(
        &self,
        paging: &Paging,
    ) -> Result<(Vec<UrlRecord>, Metadata), StoreError> {
        let mut query = "SELECT id, url, first_encountered, last_checked, last_saved, \
             is_monitored, is_alive, version, count(*) OVER() AS total_records \
             FROM urls WHERE is_monitored = 1 AND is_alive = 1"
            .to_string();
        query.push_str(&paging.order_by()?);
        query.push_str(" LIMIT __ARG__ OFFSET __ARG__");

        let query = self.dialect.rewrite(&query);
        let rows = with_deadline(
            sqlx::query(&query)
                .bind(paging.limit())
                .bind(paging.offset())
                .fetch_all(&self.reader),
        )
        .await?;
        let total: i64 = match rows.first() {
            Some(row) => row.try_get("total_records")?,
            None => 0,
        };
        let urls = rows
            .iter()
            .map(UrlRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((urls, Metadata::calculate(total, paging.page, paging.page_size)))
    }
}
