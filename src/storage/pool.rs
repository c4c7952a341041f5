//! Database connection pool initialization.
//!
//! SQLite permits a single writer, so the embedded backend runs in WAL
//! mode with a pool of readers and a one-connection writer pool. The
//! writer opens first (creating the database file and the WAL journal)
//! and the readers attach read-only once the schema exists. PostgreSQL
//! needs no such split; one pool serves both roles. Nothing above the
//! Store boundary sees the difference.

use std::time::Duration;

use log::info;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use super::StoreError;

const DB_MAX_OPEN_CONNS: u32 = 25;
const DB_CONN_MAX_IDLE: Duration = Duration::from_secs(10 * 60);

/// Opens the single-connection sqlite writer, creating the database file
/// and switching it to WAL mode.
pub(crate) async fn open_sqlite_writer(sqlite_path: &str) -> Result<AnyPool, StoreError> {
    sqlx::any::install_default_drivers();
    info!("Using sqlite driver");

    let writer = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(DB_CONN_MAX_IDLE)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&format!("sqlite://{sqlite_path}?mode=rwc"))
        .await?;

    // WAL is a property of the database file, setting it once on the
    // writer is enough
    sqlx::query("PRAGMA journal_mode = WAL").execute(&writer).await?;

    Ok(writer)
}

/// Opens the read-only sqlite reader pool. Call after the schema exists so
/// the first reader never sees a half-initialized database.
pub(crate) async fn open_sqlite_readers(sqlite_path: &str) -> Result<AnyPool, StoreError> {
    let reader = AnyPoolOptions::new()
        .max_connections(DB_MAX_OPEN_CONNS)
        .idle_timeout(DB_CONN_MAX_IDLE)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&format!("sqlite://{sqlite_path}?mode=ro"))
        .await?;
    Ok(reader)
}

/// Opens the postgres pool, shared by readers and the writer.
pub(crate) async fn open_postgres(dsn: &str) -> Result<AnyPool, StoreError> {
    sqlx::any::install_default_drivers();
    info!("Using postgres driver");

    let pool = AnyPoolOptions::new()
        .max_connections(DB_MAX_OPEN_CONNS)
        .idle_timeout(DB_CONN_MAX_IDLE)
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;
    Ok(pool)
}
