//! Test utilities and fixtures for Keyshelf integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use rusqlite::{Connection, params};
use tempfile::TempDir;

pub use keyshelf::db::{AppState, DbPool, create_pool, init_db, queries};
pub use keyshelf::error::AppError;
pub use keyshelf::handlers;
pub use keyshelf::intents::*;
pub use keyshelf::models::*;

pub const ONE_DAY: i64 = 86400;
pub const TEST_ADMIN_KEY: &str = "test-admin-key";

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// A file-backed pool, so every pooled connection sees the same database.
/// Keep the returned `TempDir` alive for as long as the pool is used.
pub fn setup_test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("keyshelf-test.db");
    let pool = create_pool(path.to_str().expect("temp path is valid UTF-8"))
        .expect("Failed to create pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    (dir, pool)
}

pub fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Upload keys and return them oldest first.
pub fn add_test_keys(conn: &mut Connection, product_id: &str, items: &[&str]) -> Vec<LicenseKey> {
    queries::add_license_keys(conn, product_id, &values(items)).expect("Failed to add keys");
    let mut keys = queries::list_license_keys(conn, Some(product_id), KeyAvailability::All)
        .expect("Failed to list keys");
    keys.reverse();
    keys
}

/// Move a claim back in time so its subscription ages.
pub fn backdate_claim(conn: &Connection, key_id: &str, used_at: i64) {
    conn.execute(
        "UPDATE license_keys SET used_at = ?1 WHERE id = ?2",
        params![used_at, key_id],
    )
    .expect("Failed to backdate claim");
}

/// Claim a key for `email` and backdate it `days_ago` days.
pub fn claim_aged(conn: &Connection, product_id: &str, email: &str, days_ago: i64) -> LicenseKey {
    let key = queries::claim_license_key(conn, product_id, email, None).expect("Failed to claim");
    backdate_claim(conn, &key.id, now() - days_ago * ONE_DAY);
    queries::get_license_key_by_id(conn, &key.id)
        .expect("Failed to reload key")
        .expect("claimed key exists")
}

pub fn test_intent(id: &str, created_at: i64) -> PurchaseIntent {
    PurchaseIntent {
        id: id.to_string(),
        created_at,
        product_id: "pro".to_string(),
        product_title: "Pro (30 days)".to_string(),
        country: Some("US".to_string()),
        email: format!("{}@example.com", id),
        phone_number: None,
    }
}

/// App state backed by a temp-file database.
pub fn create_test_app_state() -> (TempDir, AppState) {
    let (dir, pool) = setup_test_pool();
    let state = AppState {
        db: pool,
        admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
        intent_events: IntentEvents::default(),
        intents: IntentHub::default(),
    };
    (dir, state)
}

pub fn test_app(state: AppState) -> Router {
    handlers::router(state.clone()).with_state(state)
}

/// Build an admin request with the test bearer key.
pub fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", TEST_ADMIN_KEY));
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
