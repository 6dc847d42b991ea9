mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::intents::{IntentEvents, IntentHub};

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Bearer key for admin routes (None disables the check, dev mode only)
    pub admin_api_key: Option<String>,
    /// Push channel for purchase intent changes
    pub intent_events: IntentEvents,
    /// Live intent ledger fed by the push listener and the poller
    pub intents: IntentHub,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
    });
    Pool::builder().max_size(10).build(manager)
}
