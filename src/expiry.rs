//! Subscription expiry rules.
//!
//! Everything here is a pure function of stored timestamps and the caller's
//! notion of "now". Results must not be cached across requests.

use crate::models::SubscriptionStatus;

pub const SECONDS_PER_DAY: i64 = 86400;

/// Length of a subscription when the key has no explicit expiration date.
pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;

/// Subscriptions with this many days or fewer remaining are "expiring".
pub const EXPIRING_WINDOW_DAYS: i64 = 3;

/// Latest accepted expiration override, counted from the claim instant.
pub const MAX_EXPIRATION_OVERRIDE_DAYS: i64 = 36_500;

/// When a subscription that started at `used_at` ends.
pub fn expiry_instant(used_at: i64, expiration_date: Option<i64>) -> i64 {
    expiration_date
        .unwrap_or_else(|| used_at.saturating_add(DEFAULT_SUBSCRIPTION_DAYS * SECONDS_PER_DAY))
}

/// Seconds left until expiry; zero or negative once expired. Saturates
/// instead of wrapping for timestamps near the i64 limits.
pub fn remaining_seconds(used_at: i64, expiration_date: Option<i64>, now: i64) -> i64 {
    expiry_instant(used_at, expiration_date).saturating_sub(now)
}

pub fn status_for_remaining(remaining: i64) -> SubscriptionStatus {
    if remaining <= 0 {
        SubscriptionStatus::Expired
    } else if remaining <= EXPIRING_WINDOW_DAYS * SECONDS_PER_DAY {
        SubscriptionStatus::Expiring
    } else {
        SubscriptionStatus::Active
    }
}
