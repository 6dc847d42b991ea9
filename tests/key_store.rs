//! License key store tests: bulk upload, atomic claims, release, and deletion guards.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use common::*;

// ============ Bulk Upload ============

#[test]
fn test_add_keys_skips_duplicates_across_calls() {
    let mut conn = setup_test_db();

    let first = queries::add_license_keys(&mut conn, "pro", &values(&["A", "B", "A"])).unwrap();
    assert_eq!(first, AddKeysOutcome { inserted: 2, skipped: 1 });

    let second = queries::add_license_keys(&mut conn, "pro", &values(&["A", "C"])).unwrap();
    assert_eq!(second, AddKeysOutcome { inserted: 1, skipped: 1 });

    let stored: HashSet<String> =
        queries::list_license_keys(&conn, Some("pro"), KeyAvailability::All)
            .unwrap()
            .into_iter()
            .map(|k| k.value)
            .collect();
    assert_eq!(stored, HashSet::from(["A".into(), "B".into(), "C".into()]));
}

#[test]
fn test_add_keys_value_is_unique_across_products() {
    let mut conn = setup_test_db();
    queries::add_license_keys(&mut conn, "starter", &values(&["SHARED"])).unwrap();

    let outcome = queries::add_license_keys(&mut conn, "pro", &values(&["SHARED"])).unwrap();
    assert_eq!(outcome.inserted, 0, "a value already used by another product is skipped");

    let key = queries::get_license_key_by_value(&conn, "SHARED").unwrap().unwrap();
    assert_eq!(key.product_id, "starter");
}

#[test]
fn test_added_keys_start_available() {
    let mut conn = setup_test_db();
    let keys = add_test_keys(&mut conn, "pro", &["A"]);
    let key = &keys[0];
    assert!(!key.is_used);
    assert!(key.used_by_email.is_none());
    assert!(key.used_at.is_none());
    assert!(key.purchase_intent_id.is_none());
}

// ============ Claim ============

#[test]
fn test_claim_takes_oldest_available_key() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["FIRST", "SECOND"]);

    let key = queries::claim_license_key(&conn, "pro", "buyer@example.com", Some("intent-1"))
        .unwrap();
    assert_eq!(key.value, "FIRST");
    assert!(key.is_used);
    assert_eq!(key.used_by_email.as_deref(), Some("buyer@example.com"));
    assert!(key.used_at.is_some());
    assert_eq!(key.purchase_intent_id.as_deref(), Some("intent-1"));

    let next = queries::claim_license_key(&conn, "pro", "other@example.com", None).unwrap();
    assert_eq!(next.value, "SECOND");
}

#[test]
fn test_claim_out_of_stock() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "starter", &["S1"]);

    let result = queries::claim_license_key(&conn, "pro", "buyer@example.com", None);
    assert!(
        matches!(result, Err(AppError::OutOfStock(_))),
        "keys of another product must not be handed out, got {:?}",
        result
    );
}

#[test]
fn test_claim_exhausts_pool_then_out_of_stock() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["ONLY"]);

    queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();
    let result = queries::claim_license_key(&conn, "pro", "b@example.com", None);
    assert!(matches!(result, Err(AppError::OutOfStock(_))));
    assert_eq!(queries::count_available_keys(&conn, "pro").unwrap(), 0);
}

#[test]
fn test_concurrent_claims_on_single_key_succeed_once() {
    let (_dir, pool) = setup_test_pool();
    {
        let mut conn = pool.get().unwrap();
        queries::add_license_keys(&mut conn, "pro", &values(&["LAST-ONE"])).unwrap();
    }

    const CALLERS: usize = 8;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                barrier.wait();
                queries::claim_license_key(&conn, "pro", &format!("c{}@example.com", i), None)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<&LicenseKey> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::OutOfStock(_))))
        .count();

    assert_eq!(winners.len(), 1, "exactly one caller gets the key");
    assert_eq!(out_of_stock, CALLERS - 1, "everyone else sees OutOfStock");
    assert_eq!(winners[0].value, "LAST-ONE");
}

#[test]
fn test_concurrent_claims_never_share_a_key() {
    let (_dir, pool) = setup_test_pool();
    {
        let mut conn = pool.get().unwrap();
        let stock: Vec<String> = (0..5).map(|i| format!("KEY-{}", i)).collect();
        queries::add_license_keys(&mut conn, "pro", &stock).unwrap();
    }

    const CALLERS: usize = 10;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                barrier.wait();
                queries::claim_license_key(&conn, "pro", &format!("c{}@example.com", i), None)
            })
        })
        .collect();

    let claimed: Vec<String> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap().ok())
        .map(|k| k.value)
        .collect();
    let distinct: HashSet<&String> = claimed.iter().collect();

    assert_eq!(claimed.len(), 5, "five keys for ten callers");
    assert_eq!(distinct.len(), 5, "no key value is returned twice");

    let conn = pool.get().unwrap();
    assert_eq!(queries::count_available_keys(&conn, "pro").unwrap(), 0);
}

// ============ Manual Claim ============

#[test]
fn test_claim_manual_by_value() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["FIRST", "PICKED"]);

    let key = queries::claim_license_key_by_value(
        &conn,
        "pro",
        "  PICKED ",
        "buyer@example.com",
        Some("intent-9"),
    )
    .unwrap();
    assert_eq!(key.value, "PICKED");
    assert_eq!(key.purchase_intent_id.as_deref(), Some("intent-9"));

    // The oldest key is untouched
    let first = queries::get_license_key_by_value(&conn, "FIRST").unwrap().unwrap();
    assert!(!first.is_used);
}

#[test]
fn test_claim_manual_already_used() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["PICKED"]);
    queries::claim_license_key_by_value(&conn, "pro", "PICKED", "a@example.com", None).unwrap();

    let result = queries::claim_license_key_by_value(&conn, "pro", "PICKED", "b@example.com", None);
    assert!(matches!(result, Err(AppError::AlreadyUsed(_))), "got {:?}", result);

    let key = queries::get_license_key_by_value(&conn, "PICKED").unwrap().unwrap();
    assert_eq!(
        key.used_by_email.as_deref(),
        Some("a@example.com"),
        "the first claim must not be overwritten"
    );
}

#[test]
fn test_claim_manual_unknown_or_wrong_product() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "starter", &["STARTER-KEY"]);

    let unknown = queries::claim_license_key_by_value(&conn, "pro", "NOPE", "a@example.com", None);
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let wrong = queries::claim_license_key_by_value(
        &conn,
        "pro",
        "STARTER-KEY",
        "a@example.com",
        None,
    );
    assert!(matches!(wrong, Err(AppError::NotFound(_))));
}

#[test]
fn test_concurrent_manual_claims_of_same_value() {
    let (_dir, pool) = setup_test_pool();
    {
        let mut conn = pool.get().unwrap();
        queries::add_license_keys(&mut conn, "pro", &values(&["CONTESTED"])).unwrap();
    }

    const CALLERS: usize = 6;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                barrier.wait();
                queries::claim_license_key_by_value(
                    &conn,
                    "pro",
                    "CONTESTED",
                    &format!("c{}@example.com", i),
                    None,
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::AlreadyUsed(_))))
            .count(),
        CALLERS - 1
    );
}

// ============ Release ============

#[test]
fn test_release_clears_usage_and_key_is_claimable_again() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["ONLY"]);

    let claimed =
        queries::claim_license_key(&conn, "pro", "a@example.com", Some("intent-1")).unwrap();
    queries::set_license_key_expiration(&conn, &claimed.id, Some(now() + 90 * ONE_DAY)).unwrap();

    assert!(queries::release_license_key(&conn, &claimed.id).unwrap());

    let released = queries::get_license_key_by_id(&conn, &claimed.id).unwrap().unwrap();
    assert!(!released.is_used);
    assert!(released.used_by_email.is_none());
    assert!(released.used_at.is_none());
    assert!(released.expiration_date.is_none());
    assert!(released.purchase_intent_id.is_none());

    let again = queries::claim_license_key(&conn, "pro", "b@example.com", None).unwrap();
    assert_eq!(again.id, claimed.id);
    assert_eq!(again.used_by_email.as_deref(), Some("b@example.com"));
}

#[test]
fn test_release_available_key_is_noop() {
    let mut conn = setup_test_db();
    let keys = add_test_keys(&mut conn, "pro", &["ONLY"]);
    assert!(!queries::release_license_key(&conn, &keys[0].id).unwrap());
}

#[test]
fn test_release_unknown_key_not_found() {
    let conn = setup_test_db();
    let result = queries::release_license_key(&conn, "missing");
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn test_release_many() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["A", "B", "C"]);
    let a = queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();
    let b = queries::claim_license_key(&conn, "pro", "b@example.com", None).unwrap();

    let released = queries::release_license_keys(
        &mut conn,
        &[a.id.clone(), b.id.clone(), "missing".to_string()],
    )
    .unwrap();
    assert_eq!(released, 2);
    assert_eq!(queries::count_available_keys(&conn, "pro").unwrap(), 3);
}

// ============ Delete ============

#[test]
fn test_remove_used_key_fails_until_released() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["ONLY"]);
    let key = queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();

    let result = queries::delete_license_key(&conn, &key.id);
    assert!(matches!(result, Err(AppError::InUse(_))), "got {:?}", result);
    assert!(queries::get_license_key_by_id(&conn, &key.id).unwrap().is_some());

    queries::release_license_key(&conn, &key.id).unwrap();
    queries::delete_license_key(&conn, &key.id).unwrap();
    assert!(queries::get_license_key_by_id(&conn, &key.id).unwrap().is_none());
}

#[test]
fn test_remove_unknown_key_not_found() {
    let conn = setup_test_db();
    let result = queries::delete_license_key(&conn, "missing");
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn test_remove_many_is_all_or_nothing_when_any_key_is_used() {
    let mut conn = setup_test_db();
    let keys = add_test_keys(&mut conn, "pro", &["A", "B", "C"]);
    let used = queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();
    assert_eq!(used.id, keys[0].id);

    let ids: Vec<String> = keys.iter().map(|k| k.id.clone()).collect();
    let result = queries::delete_license_keys(&mut conn, &ids);
    match result {
        Err(AppError::InUse(msg)) => assert!(msg.contains(&used.id), "message names the used key"),
        other => panic!("expected InUse, got {:?}", other),
    }

    let remaining = queries::list_license_keys(&conn, Some("pro"), KeyAvailability::All).unwrap();
    assert_eq!(remaining.len(), 3, "nothing was deleted");
}

#[test]
fn test_remove_many_reports_missing_ids() {
    let mut conn = setup_test_db();
    let keys = add_test_keys(&mut conn, "pro", &["A", "B"]);

    let ids = vec![keys[0].id.clone(), keys[1].id.clone(), keys[0].id.clone(), "ghost".into()];
    let outcome = queries::delete_license_keys(&mut conn, &ids).unwrap();
    assert_eq!(
        outcome,
        RemoveKeysOutcome {
            removed: 2,
            not_found: vec!["ghost".to_string()],
        }
    );
}

// ============ Expiration Override & Inventory ============

#[test]
fn test_set_expiration_only_on_claimed_keys() {
    let mut conn = setup_test_db();
    let keys = add_test_keys(&mut conn, "pro", &["A", "B"]);

    let result = queries::set_license_key_expiration(&conn, &keys[1].id, Some(now()));
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let claimed = queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();
    let until = now() + 60 * ONE_DAY;
    let updated = queries::set_license_key_expiration(&conn, &claimed.id, Some(until)).unwrap();
    assert_eq!(updated.expiration_date, Some(until));

    let cleared = queries::set_license_key_expiration(&conn, &claimed.id, None).unwrap();
    assert_eq!(cleared.expiration_date, None);

    let missing = queries::set_license_key_expiration(&conn, "ghost", None);
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[test]
fn test_set_expiration_rejects_out_of_range_values() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["A"]);
    let claimed = queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();
    let used_at = claimed.used_at.unwrap();

    for bad in [i64::MIN, used_at - 1, i64::MAX] {
        let result = queries::set_license_key_expiration(&conn, &claimed.id, Some(bad));
        assert!(
            matches!(result, Err(AppError::BadRequest(_))),
            "{} should be rejected, got {:?}",
            bad,
            result
        );
    }

    let stored = queries::get_license_key_by_id(&conn, &claimed.id).unwrap().unwrap();
    assert_eq!(stored.expiration_date, None, "rejected values are not stored");

    // Expiring a subscription on the spot is allowed
    let now_override = queries::set_license_key_expiration(&conn, &claimed.id, Some(used_at))
        .unwrap();
    assert_eq!(now_override.expiration_date, Some(used_at));
}

#[test]
fn test_inventory_counts_per_product() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["P1", "P2", "P3"]);
    add_test_keys(&mut conn, "starter", &["S1"]);
    queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();

    let inventory = queries::get_inventory(&conn).unwrap();
    assert_eq!(
        inventory,
        vec![
            ProductInventory {
                product_id: "pro".into(),
                available: 2,
                used: 1,
                total: 3,
            },
            ProductInventory {
                product_id: "starter".into(),
                available: 1,
                used: 0,
                total: 1,
            },
        ]
    );
}

#[test]
fn test_list_keys_by_availability() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["A", "B"]);
    queries::claim_license_key(&conn, "pro", "a@example.com", None).unwrap();

    let available =
        queries::list_license_keys(&conn, Some("pro"), KeyAvailability::Available).unwrap();
    let used = queries::list_license_keys(&conn, None, KeyAvailability::Used).unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].value, "B");
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].value, "A");
}

#[test]
fn test_completed_intents_derived_from_claims() {
    let mut conn = setup_test_db();
    add_test_keys(&mut conn, "pro", &["A", "B"]);
    queries::claim_license_key(&conn, "pro", "a@example.com", Some("intent-1")).unwrap();
    queries::claim_license_key(&conn, "pro", "b@example.com", None).unwrap();

    let completed = queries::list_completed_intent_ids(&conn).unwrap();
    assert_eq!(completed, HashSet::from(["intent-1".to_string()]));
}
