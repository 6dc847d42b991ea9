//! Subscription read model built from used license keys.
//!
//! Per-customer counts are computed over every used key before any filter is
//! applied, so a customer's `active_count` does not change when the operator
//! narrows the view by product, search term, or status.

use std::collections::HashMap;

use crate::expiry;
use crate::models::{
    LicenseKey, StatusFilter, SubscriptionFilter, SubscriptionRecord, SubscriptionStatus,
    SubscriptionSummary,
};

#[derive(Debug, Default, Clone, Copy)]
struct CustomerTotals {
    purchases: usize,
    active: usize,
}

/// A used key with its subscription evaluated at one instant.
struct Evaluated<'a> {
    key: &'a LicenseKey,
    email: &'a str,
    expires_at: i64,
    remaining: i64,
    status: SubscriptionStatus,
}

/// Emails are compared case-insensitively.
fn customer_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Used keys paired with their status at `now`. Unclaimed keys are dropped.
fn evaluate(keys: &[LicenseKey], now: i64) -> Vec<Evaluated<'_>> {
    keys.iter()
        .filter_map(|key| {
            let email = key.used_by_email.as_deref()?;
            let used_at = key.used_at.filter(|_| key.is_used)?;
            let remaining = expiry::remaining_seconds(used_at, key.expiration_date, now);
            Some(Evaluated {
                key,
                email,
                expires_at: expiry::expiry_instant(used_at, key.expiration_date),
                remaining,
                status: expiry::status_for_remaining(remaining),
            })
        })
        .collect()
}

fn customer_totals(evaluated: &[Evaluated<'_>]) -> HashMap<String, CustomerTotals> {
    let mut totals: HashMap<String, CustomerTotals> = HashMap::new();
    for entry in evaluated {
        let customer = totals.entry(customer_key(entry.email)).or_default();
        customer.purchases += 1;
        if entry.status.is_live() {
            customer.active += 1;
        }
    }
    totals
}

fn matches_search(key: &LicenseKey, email: &str, term: &str) -> bool {
    email.to_lowercase().contains(term) || key.value.to_lowercase().contains(term)
}

fn matches_status(status: SubscriptionStatus, active_count: usize, filter: StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Active => status.is_live(),
        StatusFilter::Expiring => status == SubscriptionStatus::Expiring,
        StatusFilter::Expired => status == SubscriptionStatus::Expired,
        StatusFilter::MultiActive => status.is_live() && active_count > 1,
    }
}

/// Build the filtered subscription list, newest claim first.
///
/// `keys` should be the full set of used keys; unused keys are ignored.
pub fn build_subscription_view(
    keys: &[LicenseKey],
    filter: &SubscriptionFilter,
    now: i64,
) -> Vec<SubscriptionRecord> {
    let evaluated = evaluate(keys, now);
    let totals = customer_totals(&evaluated);

    let search = filter
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut records: Vec<SubscriptionRecord> = evaluated
        .into_iter()
        .filter(|entry| {
            filter
                .product_id
                .as_deref()
                .is_none_or(|product_id| entry.key.product_id == product_id)
        })
        .filter(|entry| {
            search
                .as_deref()
                .is_none_or(|term| matches_search(entry.key, entry.email, term))
        })
        .filter_map(|entry| {
            let counts = totals
                .get(&customer_key(entry.email))
                .copied()
                .unwrap_or_default();
            if !matches_status(entry.status, counts.active, filter.status) {
                return None;
            }
            Some(SubscriptionRecord {
                key: entry.key.clone(),
                expires_at: entry.expires_at,
                remaining_seconds: entry.remaining,
                status: entry.status,
                purchase_count: counts.purchases,
                active_count: counts.active,
                is_loyal: counts.purchases > 1,
                is_multi_active: counts.active > 1,
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.key
            .used_at
            .cmp(&a.key.used_at)
            .then_with(|| b.key.id.cmp(&a.key.id))
    });
    records
}

/// Headline counts over every used key, ignoring any filter.
pub fn summarize(keys: &[LicenseKey], now: i64) -> SubscriptionSummary {
    let evaluated = evaluate(keys, now);
    let totals = customer_totals(&evaluated);

    let mut summary = SubscriptionSummary {
        customers: totals.len(),
        multi_active_customers: totals.values().filter(|t| t.active > 1).count(),
        ..Default::default()
    };
    for entry in &evaluated {
        match entry.status {
            SubscriptionStatus::Active => summary.active += 1,
            SubscriptionStatus::Expiring => summary.expiring += 1,
            SubscriptionStatus::Expired => summary.expired += 1,
        }
    }
    summary
}
