//! Storage entities and their row mappings.
//!
//! Timestamps are stored as epoch milliseconds (`BIGINT`) so the same row
//! mapping works for both backends; they surface as `chrono::DateTime<Utc>`.
//! Boolean flags are stored as integers for the same reason.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;

use super::StoreError;

/// Column names of the `urls` table, also the sort whitelist base.
pub const URL_COLUMNS: &[&str] = &[
    "id",
    "url",
    "first_encountered",
    "last_checked",
    "last_saved",
    "is_monitored",
    "is_alive",
    "version",
];

/// Column names of the `pages` table.
pub const PAGE_COLUMNS: &[&str] = &["id", "url_id", "added_at", "content"];

/// A discovered URL and its monitoring state.
#[derive(Debug, Clone, Serialize)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub first_encountered: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_saved: Option<DateTime<Utc>>,
    pub is_monitored: bool,
    pub is_alive: bool,
    pub version: i64,
}

impl UrlRecord {
    /// A fresh record with `first_encountered` set to now. The id and
    /// version are assigned by the store on insert.
    pub fn new(url: String, is_monitored: bool) -> Self {
        Self {
            id: 0,
            url,
            first_encountered: Utc::now(),
            last_checked: None,
            last_saved: None,
            is_monitored,
            is_alive: true,
            version: 1,
        }
    }

    pub(crate) fn from_row(row: &AnyRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            first_encountered: millis_to_datetime(row.try_get("first_encountered")?),
            last_checked: opt_millis_to_datetime(row.try_get("last_checked")?),
            last_saved: opt_millis_to_datetime(row.try_get("last_saved")?),
            is_monitored: int_to_bool(row.try_get("is_monitored")?),
            is_alive: int_to_bool(row.try_get("is_alive")?),
            version: row.try_get("version")?,
        })
    }
}

/// One captured snapshot of a URL's content. Insert-only.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub id: i64,
    pub url_id: i64,
    pub added_at: DateTime<Utc>,
    pub content: String,
}

impl PageRecord {
    /// A fresh snapshot with `added_at` set to now.
    pub fn new(url_id: i64, content: String) -> Self {
        Self {
            id: 0,
            url_id,
            added_at: Utc::now(),
            content,
        }
    }

    pub(crate) fn from_row(row: &AnyRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            url_id: row.try_get("url_id")?,
            added_at: millis_to_datetime(row.try_get("added_at")?),
            content: row.try_get("content")?,
        })
    }
}

/// Read-only projection used by the disk exporter: the latest snapshot per
/// URL together with the URL itself.
#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub url: String,
    pub added_at: DateTime<Utc>,
    pub content: String,
}

impl PageContent {
    pub(crate) fn from_row(row: &AnyRow) -> Result<Self, StoreError> {
        Ok(Self {
            url: row.try_get("url")?,
            added_at: millis_to_datetime(row.try_get("added_at")?),
            content: row.try_get("content")?,
        })
    }
}

pub(crate) fn datetime_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn opt_datetime_to_millis(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(datetime_to_millis)
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

pub(crate) fn opt_millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.map(millis_to_datetime)
}

pub(crate) fn int_to_bool(v: i64) -> bool {
    v != 0
}

pub(crate) fn bool_to_int(v: bool) -> i64 {
    i64::from(v)
}
