//! Idempotent schema initialization.
//!
//! Tables and indexes are created when missing; databases written by
//! versions that predate the `is_alive` column are migrated in place.

use sqlx::AnyPool;

use super::{with_deadline, Dialect, StoreError};

const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT UNIQUE NOT NULL,
        first_encountered BIGINT NOT NULL,
        last_checked BIGINT DEFAULT NULL,
        last_saved BIGINT DEFAULT NULL,
        is_monitored BIGINT NOT NULL DEFAULT 0,
        is_alive BIGINT NOT NULL DEFAULT 1,
        version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 0)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_urls_lower_url ON urls (LOWER(url))",
    "CREATE TABLE IF NOT EXISTS pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url_id BIGINT NOT NULL REFERENCES urls (id) ON DELETE CASCADE,
        added_at BIGINT NOT NULL,
        content TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_pages_url_id ON pages (url_id)",
];

const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS urls (
        id bigserial PRIMARY KEY,
        url TEXT UNIQUE NOT NULL,
        first_encountered BIGINT NOT NULL,
        last_checked BIGINT DEFAULT NULL,
        last_saved BIGINT DEFAULT NULL,
        is_monitored BIGINT NOT NULL DEFAULT 0,
        is_alive BIGINT NOT NULL DEFAULT 1,
        version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 0)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_urls_lower_url ON urls (LOWER(url))",
    "CREATE TABLE IF NOT EXISTS pages (
        id bigserial PRIMARY KEY,
        url_id BIGINT NOT NULL REFERENCES urls ON DELETE CASCADE,
        added_at BIGINT NOT NULL,
        content TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_pages_url_id ON pages (url_id)",
    "ALTER TABLE urls ADD COLUMN IF NOT EXISTS is_alive BIGINT NOT NULL DEFAULT 1",
];

/// Creates tables and indexes when missing and applies the `is_alive`
/// migration. Safe to run on every start.
pub(crate) async fn init_schema(writer: &AnyPool, dialect: Dialect) -> Result<(), StoreError> {
    let statements = match dialect {
        Dialect::Sqlite => SQLITE_SCHEMA,
        Dialect::Postgres => POSTGRES_SCHEMA,
    };
    for statement in statements {
        with_deadline(sqlx::query(statement).execute(writer)).await?;
    }

    // sqlite has no ADD COLUMN IF NOT EXISTS, probe the table info instead
    if dialect == Dialect::Sqlite {
        let existing = with_deadline(
            sqlx::query("SELECT name FROM pragma_table_info('urls') WHERE name = 'is_alive'")
                .fetch_optional(writer),
        )
        .await?;
        if existing.is_none() {
            with_deadline(
                sqlx::query("ALTER TABLE urls ADD COLUMN is_alive BIGINT NOT NULL DEFAULT 1")
                    .execute(writer),
            )
            .await?;
        }
    }

    Ok(())
}
