//! Store integration tests against a temporary sqlite database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pagewatch::storage::{
    Paging, PageRecord, Store, StoreError, UrlFilter, UrlRecord, PAGE_COLUMNS, URL_COLUMNS,
};

async fn temp_store() -> (Arc<Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("crawler.db");
    let store = Store::connect("", path.to_str().unwrap())
        .await
        .expect("store connects");
    (Arc::new(store), dir)
}

async fn insert_url(store: &Store, url: &str, is_monitored: bool) -> UrlRecord {
    let mut rec = UrlRecord::new(url.to_string(), is_monitored);
    store.urls.insert(&mut rec).await.expect("insert url");
    rec
}

#[tokio::test]
async fn test_schema_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawler.db");
    let store = Store::connect("", path.to_str().unwrap()).await.unwrap();
    store.close().await;
    // second connect re-runs the DDL against the existing file
    let store = Store::connect("", path.to_str().unwrap()).await.unwrap();
    insert_url(&store, "https://h.example/a", false).await;
    store.close().await;
}

#[tokio::test]
async fn test_is_alive_migration_on_legacy_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawler.db");

    // a database created before the is_alive column existed
    sqlx::any::install_default_drivers();
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}?mode=rwc", path.to_str().unwrap()))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT UNIQUE NOT NULL,
            first_encountered BIGINT NOT NULL,
            last_checked BIGINT DEFAULT NULL,
            last_saved BIGINT DEFAULT NULL,
            is_monitored BIGINT NOT NULL DEFAULT 0,
            version BIGINT NOT NULL DEFAULT 1
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO urls (url, first_encountered) VALUES ('https://h.example/old', 0)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let store = Store::connect("", path.to_str().unwrap()).await.unwrap();
    let rec = store.urls.get_by_url("https://h.example/old").await.unwrap();
    assert!(rec.is_alive, "migrated rows default to alive");
    store.close().await;
}

#[tokio::test]
async fn test_insert_assigns_id_and_version() {
    let (store, _dir) = temp_store().await;
    let rec = insert_url(&store, "https://h.example/a", false).await;
    assert!(rec.id > 0);
    assert_eq!(rec.version, 1);

    let loaded = store.urls.get_by_id(rec.id).await.unwrap();
    assert_eq!(loaded.url, "https://h.example/a");
    assert!(loaded.is_alive);
    assert!(loaded.last_checked.is_none());
}

#[tokio::test]
async fn test_unique_url_constraint() {
    let (store, _dir) = temp_store().await;
    insert_url(&store, "https://h.example/a", false).await;
    let mut dup = UrlRecord::new("https://h.example/a".to_string(), false);
    let err = store.urls.insert(&mut dup).await.unwrap_err();
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_get_by_url_and_missing_records() {
    let (store, _dir) = temp_store().await;
    assert!(matches!(
        store.urls.get_by_url("").await,
        Err(StoreError::NullUrl)
    ));
    assert!(matches!(
        store.urls.get_by_url("https://h.example/none").await,
        Err(StoreError::RecordNotFound)
    ));
    assert!(matches!(
        store.urls.get_by_id(9999).await,
        Err(StoreError::RecordNotFound)
    ));
    assert!(matches!(
        store.urls.get_by_id(0).await,
        Err(StoreError::RecordNotFound)
    ));
}

#[tokio::test]
async fn test_update_bumps_version() {
    let (store, _dir) = temp_store().await;
    let mut rec = insert_url(&store, "https://h.example/a", false).await;
    rec.last_checked = Some(Utc::now());
    store.urls.update(&mut rec).await.unwrap();
    assert_eq!(rec.version, 2);

    let loaded = store.urls.get_by_id(rec.id).await.unwrap();
    assert_eq!(loaded.version, 2);
    assert!(loaded.last_checked.is_some());
}

#[tokio::test]
async fn test_stale_update_fails_with_edit_conflict_and_leaves_row_unchanged() {
    let (store, _dir) = temp_store().await;
    let rec = insert_url(&store, "https://h.example/a", false).await;

    // two readers at version 1
    let mut first = store.urls.get_by_id(rec.id).await.unwrap();
    let mut second = store.urls.get_by_id(rec.id).await.unwrap();

    first.is_monitored = true;
    store.urls.update(&mut first).await.unwrap();
    assert_eq!(first.version, 2);

    second.is_monitored = false;
    second.last_checked = Some(Utc::now());
    let err = store.urls.update(&mut second).await.unwrap_err();
    assert!(matches!(err, StoreError::EditConflict));

    // the loser's write left no trace
    let loaded = store.urls.get_by_id(rec.id).await.unwrap();
    assert_eq!(loaded.version, 2);
    assert!(loaded.is_monitored);
    assert!(loaded.last_checked.is_none());
}

#[tokio::test]
async fn test_delete_url_cascades_to_pages() {
    let (store, _dir) = temp_store().await;
    let rec = insert_url(&store, "https://h.example/a", true).await;

    let mut page = PageRecord::new(rec.id, "<html>".repeat(30));
    store.pages.insert(&mut page).await.unwrap();
    assert!(page.id > 0);

    store.urls.delete(rec.id).await.unwrap();
    assert!(matches!(
        store.urls.get_by_id(rec.id).await,
        Err(StoreError::RecordNotFound)
    ));
    // the page went with its parent URL
    assert!(matches!(
        store.pages.get_by_id(page.id).await,
        Err(StoreError::RecordNotFound)
    ));
}

#[tokio::test]
async fn test_delete_missing_url() {
    let (store, _dir) = temp_store().await;
    assert!(matches!(
        store.urls.delete(12345).await,
        Err(StoreError::RecordNotFound)
    ));
}

#[tokio::test]
async fn test_get_all_filters_and_metadata() {
    let (store, _dir) = temp_store().await;
    insert_url(&store, "https://h.example/a", true).await;
    insert_url(&store, "https://h.example/b", false).await;
    let mut dead = UrlRecord::new("https://h.example/dead".to_string(), true);
    dead.is_alive = false;
    store.urls.insert(&mut dead).await.unwrap();

    let paging = Paging::new(1, 10, "id", URL_COLUMNS);

    let (all, meta) = store.urls.get_all(&UrlFilter::default(), &paging).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(meta.total_records, 3);
    assert_eq!(meta.last_page, 1);

    let monitored_filter = UrlFilter {
        is_monitored: Some(true),
        ..UrlFilter::default()
    };
    let (monitored, _) = store.urls.get_all(&monitored_filter, &paging).await.unwrap();
    assert_eq!(monitored.len(), 2);

    let alive_monitored = UrlFilter {
        is_monitored: Some(true),
        is_alive: Some(true),
        ..UrlFilter::default()
    };
    let (rows, _) = store.urls.get_all(&alive_monitored, &paging).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].url, "https://h.example/a");

    let substring = UrlFilter {
        url: "/dea".to_string(),
        ..UrlFilter::default()
    };
    let (rows, meta) = store.urls.get_all(&substring, &paging).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(meta.total_records, 1);
}

#[tokio::test]
async fn test_get_all_monitored_preset() {
    let (store, _dir) = temp_store().await;
    insert_url(&store, "https://h.example/a", true).await;
    insert_url(&store, "https://h.example/b", false).await;
    let mut dead = UrlRecord::new("https://h.example/dead".to_string(), true);
    dead.is_alive = false;
    store.urls.insert(&mut dead).await.unwrap();

    let paging = Paging::new(1, 10, "id", URL_COLUMNS);
    let (rows, meta) = store.urls.get_all_monitored(&paging).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].url, "https://h.example/a");
    assert_eq!(meta.total_records, 1);
}

#[tokio::test]
async fn test_get_all_pagination_and_sort() {
    let (store, _dir) = temp_store().await;
    for i in 0..5 {
        insert_url(&store, &format!("https://h.example/p{i}"), false).await;
    }

    let page1 = Paging::new(1, 2, "-url", URL_COLUMNS);
    let (rows, meta) = store.urls.get_all(&UrlFilter::default(), &page1).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].url, "https://h.example/p4");
    assert_eq!(meta.total_records, 5);
    assert_eq!(meta.last_page, 3);

    let page3 = Paging::new(3, 2, "-url", URL_COLUMNS);
    let (rows, _) = store.urls.get_all(&UrlFilter::default(), &page3).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].url, "https://h.example/p0");
}

#[tokio::test]
async fn test_unsafe_sort_key_is_rejected() {
    let (store, _dir) = temp_store().await;
    let paging = Paging::new(1, 10, "version; DROP TABLE urls", URL_COLUMNS);
    let err = store
        .urls
        .get_all(&UrlFilter::default(), &paging)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidOrderBy(_)));
}

#[tokio::test]
async fn test_pages_by_url_sorted() {
    let (store, _dir) = temp_store().await;
    let rec = insert_url(&store, "https://h.example/a", true).await;
    let base = Utc::now();
    for i in 0..3 {
        let mut page = PageRecord::new(rec.id, format!("content {i} {}", "x".repeat(100)));
        page.added_at = base + Duration::seconds(i);
        store.pages.insert(&mut page).await.unwrap();
    }

    let newest_first = Paging::new(1, 10, "-added_at", PAGE_COLUMNS);
    let (pages, meta) = store.pages.get_all_by_url(rec.id, &newest_first).await.unwrap();
    assert_eq!(meta.total_records, 3);
    assert!(pages[0].added_at >= pages[1].added_at);
    assert!(pages[1].added_at >= pages[2].added_at);
}

#[tokio::test]
async fn test_latest_pages_projection() {
    let (store, _dir) = temp_store().await;
    let a = insert_url(&store, "https://h.example/a", true).await;
    let bc = insert_url(&store, "https://h.example/b/c", true).await;
    let unmonitored = insert_url(&store, "https://h.example/u", false).await;

    let t1 = Utc::now() - Duration::hours(3);
    let t2 = t1 + Duration::hours(1);
    let t3 = t1 + Duration::hours(2);

    for url in [&a, &bc, &unmonitored] {
        for (label, at) in [("t1", t1), ("t2", t2), ("t3", t3)] {
            let mut page = PageRecord::new(url.id, format!("{label} of {}", url.url));
            page.added_at = at;
            store.pages.insert(&mut page).await.unwrap();
        }
    }

    let cutoff = t2 + Duration::seconds(1);
    let count = store
        .pages
        .latest_page_count("https://h.example", "", cutoff)
        .await
        .unwrap();
    // the unmonitored URL is excluded
    assert_eq!(count, 2);

    let contents = store
        .pages
        .latest_pages("https://h.example", "", cutoff, 1, 20)
        .await
        .unwrap();
    assert_eq!(contents.len(), 2);
    // the newest snapshot not past the cutoff is t2's
    for content in &contents {
        assert!(content.content.starts_with("t2 of "));
        assert_eq!(content.added_at.timestamp_millis(), t2.timestamp_millis());
    }

    // marked substring narrows the projection
    let count = store
        .pages
        .latest_page_count("https://h.example", "/b/", cutoff)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // a different base matches nothing
    let count = store
        .pages
        .latest_page_count("https://other.example", "", cutoff)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_latest_pages_pagination() {
    let (store, _dir) = temp_store().await;
    for i in 0..25 {
        let rec = insert_url(&store, &format!("https://h.example/p{i:02}"), true).await;
        let mut page = PageRecord::new(rec.id, format!("page {i}"));
        store.pages.insert(&mut page).await.unwrap();
    }

    let cutoff = Utc::now() + Duration::seconds(1);
    let count = store
        .pages
        .latest_page_count("https://h.example", "", cutoff)
        .await
        .unwrap();
    assert_eq!(count, 25);

    let first = store
        .pages
        .latest_pages("https://h.example", "", cutoff, 1, 20)
        .await
        .unwrap();
    let second = store
        .pages
        .latest_pages("https://h.example", "", cutoff, 2, 20)
        .await
        .unwrap();
    assert_eq!(first.len(), 20);
    assert_eq!(second.len(), 5);
}
