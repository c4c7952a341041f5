//! Persistent storage for URLs and page snapshots.
//!
//! Two backends share one set of models: the embedded sqlite file database
//! (reader pool + single writer, WAL) and PostgreSQL (one pool). Queries
//! are authored dialect-neutral with the `__ARG__` placeholder and rewritten
//! per dialect at query time; every call runs under a bounded deadline.

mod dialect;
mod filters;
mod models;
mod pages;
mod pool;
mod schema;
mod urls;

use std::future::Future;
use std::time::Duration;

use log::warn;
use sqlx::AnyPool;
use thiserror::Error;

pub use dialect::{Dialect, QUERY_ARG};
pub use filters::{Metadata, Paging, UrlFilter};
pub use models::{PageContent, PageRecord, UrlRecord, PAGE_COLUMNS, URL_COLUMNS};
pub use pages::PageStore;
pub use urls::UrlStore;

/// Per-query deadline.
pub const DB_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed store errors; callers map these rather than inspecting SQL errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store: record not found")]
    RecordNotFound,

    #[error("store: url cannot be empty or null")]
    NullUrl,

    #[error("store: edit conflict")]
    EditConflict,

    #[error("store: invalid order by: {0}")]
    InvalidOrderBy(String),

    #[error("store: query exceeded the {}s deadline", DB_TIMEOUT.as_secs())]
    Timeout,

    #[error("store: {0}")]
    Sql(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the underlying SQL error is a unique-constraint violation
    /// (e.g. inserting a URL that already exists).
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Sql(sqlx::Error::Database(db)) if db.is_unique_violation())
    }
}

/// Awaits a query future under the store deadline.
pub(crate) async fn with_deadline<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(DB_TIMEOUT, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout),
    }
}

/// The capability surface the crawler, exporter and management API share.
pub struct Store {
    pub urls: UrlStore,
    pub pages: PageStore,
    dialect: Dialect,
    reader: AnyPool,
    writer: AnyPool,
}

impl Store {
    /// Connects to the backend selected by `dsn` (empty = embedded sqlite
    /// file at `sqlite_path`) and ensures the schema exists.
    pub async fn connect(dsn: &str, sqlite_path: &str) -> Result<Self, StoreError> {
        let dialect = Dialect::from_dsn(dsn);
        let (reader, writer) = match dialect {
            Dialect::Sqlite => {
                let writer = pool::open_sqlite_writer(sqlite_path).await?;
                schema::init_schema(&writer, dialect).await?;
                let reader = pool::open_sqlite_readers(sqlite_path).await?;
                (reader, writer)
            }
            Dialect::Postgres => {
                let pool = pool::open_postgres(dsn).await?;
                schema::init_schema(&pool, dialect).await?;
                (pool.clone(), pool)
            }
        };
        Ok(Self {
            urls: UrlStore {
                reader: reader.clone(),
                writer: writer.clone(),
                dialect,
            },
            pages: PageStore {
                reader: reader.clone(),
                writer: writer.clone(),
                dialect,
            },
            dialect,
            reader,
            writer,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Consolidates the WAL journal into the database file (sqlite only).
    /// Called once before closing so a copied database file is complete.
    pub async fn checkpoint(&self) {
        if self.dialect == Dialect::Sqlite {
            match tokio::time::timeout(
                Duration::from_secs(10),
                sqlx::query("PRAGMA wal_checkpoint(FULL)").execute(&self.writer),
            )
            .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("WAL checkpoint failed: {e}"),
                Err(_) => warn!("WAL checkpoint timed out"),
            }
        }
    }

    /// Checkpoints and closes both pools, reader first so the writer is the
    /// last connection to leave.
    pub async fn close(&self) {
        self.checkpoint().await;
        self.reader.close().await;
        self.writer.close().await;
    }
}
