use std::time::Duration;

use crate::models::PurchaseIntent;

/// Intents older than this when first merged do not raise an alert.
pub const DEFAULT_ALERT_FRESHNESS: Duration = Duration::from_secs(60);

/// Decides which newly merged intents deserve a user-facing alert.
///
/// Only freshness is checked here. At-most-once comes from the ledger: an id
/// is returned by `merge` a single time, ever.
#[derive(Debug, Clone, Copy)]
pub struct NotificationGate {
    freshness_secs: i64,
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_FRESHNESS)
    }
}

impl NotificationGate {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness_secs: i64::try_from(freshness.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// True when the intent was created less than the freshness window ago.
    /// Keeps a reconnect or first bulk load from alerting on old history.
    pub fn is_fresh(&self, intent: &PurchaseIntent, now: i64) -> bool {
        now.saturating_sub(intent.created_at) < self.freshness_secs
    }

    pub fn select<'a>(&self, merged: &'a [PurchaseIntent], now: i64) -> Vec<&'a PurchaseIntent> {
        merged.iter().filter(|i| self.is_fresh(i, now)).collect()
    }
}
