//! List filters, paging and result metadata for the store's list queries.

use serde::Serialize;

use super::StoreError;
use crate::validation::{permitted_value, Validator};

/// Filter for URL listings. The `is_monitored` / `is_alive` options are
/// tri-state: `None` leaves the column unconstrained.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    /// Substring match on the url column.
    pub url: String,
    pub is_monitored: Option<bool>,
    pub is_alive: Option<bool>,
}

/// Common paging parameters shared by all list queries.
#[derive(Debug, Clone)]
pub struct Paging {
    pub page: i64,
    pub page_size: i64,
    /// A whitelisted column name, optionally prefixed with `-` for
    /// descending order.
    pub sort: String,
    pub sort_safe_list: Vec<String>,
}

impl Paging {
    /// Paging over `columns` sorted by `sort`; the safe list covers each
    /// column and its `-` descending variant.
    pub fn new(page: i64, page_size: i64, sort: &str, columns: &[&str]) -> Self {
        let mut sort_safe_list: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        sort_safe_list.extend(columns.iter().map(|c| format!("-{c}")));
        Self {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safe_list,
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// The ORDER BY clause for this paging, or `InvalidOrderBy` when the
    /// sort key is not whitelisted. The sort value is interpolated into the
    /// query text, which is why it must pass the whitelist first.
    pub fn order_by(&self) -> Result<String, StoreError> {
        if !permitted_value(&self.sort, &self.sort_safe_list) {
            return Err(StoreError::InvalidOrderBy(self.sort.clone()));
        }
        let (column, direction) = match self.sort.strip_prefix('-') {
            Some(column) => (column, "DESC"),
            None => (self.sort.as_str(), "ASC"),
        };
        Ok(format!(" ORDER BY {column} {direction}, id ASC"))
    }

    /// Boundary validation per the shared paging rules.
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= 1_000_000, "page", "cannot be greater than 1 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= 100, "page_size", "must be a maximum of 100");
        v.check(
            permitted_value(&self.sort, &self.sort_safe_list),
            "sort",
            "invalid sort value",
        );
    }
}

/// Paging metadata returned alongside list results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    /// Computes metadata from a windowed total count; an empty result set
    /// yields the zero value.
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
