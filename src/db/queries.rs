use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::expiry::{MAX_EXPIRATION_OVERRIDE_DAYS, SECONDS_PER_DAY};
use crate::models::*;

use super::from_row::{LICENSE_KEY_COLS, PURCHASE_INTENT_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a license value in the familiar format: PREFIX-XXXX-XXXX-XXXX-XXXX
pub fn generate_license_value(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();

    let mut part = || -> String {
        (0..4)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect()
    };

    format!("{}-{}-{}-{}-{}", prefix, part(), part(), part(), part())
}

// ============ License Keys ============

/// Insert keys for a product, skipping values that already exist anywhere in
/// the store (or earlier in the same batch). Runs in a single transaction.
pub fn add_license_keys(
    conn: &mut Connection,
    product_id: &str,
    values: &[String],
) -> Result<AddKeysOutcome> {
    let now = now();
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let mut inserted = 0;
    let mut skipped = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO license_keys (id, product_id, value, is_used, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
        )?;
        for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            if stmt.execute(params![gen_id(), product_id, value, now])? > 0 {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }
    }

    tx.commit()?;
    Ok(AddKeysOutcome { inserted, skipped })
}

/// Atomically claim the oldest available key for a product.
///
/// Selection and the used flag flip happen in one UPDATE statement, so two
/// concurrent callers can never receive the same key. Returns `OutOfStock`
/// when the product has no available key left.
pub fn claim_license_key(
    conn: &Connection,
    product_id: &str,
    email: &str,
    intent_id: Option<&str>,
) -> Result<LicenseKey> {
    let now = now();
    let claimed: Option<LicenseKey> = query_one(
        conn,
        &format!(
            "UPDATE license_keys
             SET is_used = 1, used_by_email = ?2, used_at = ?3, purchase_intent_id = ?4
             WHERE id = (
                 SELECT id FROM license_keys
                 WHERE product_id = ?1 AND is_used = 0
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1
             ) AND is_used = 0
             RETURNING {}",
            LICENSE_KEY_COLS
        ),
        &[&product_id, &email, &now, &intent_id],
    )?;

    claimed.ok_or_else(|| {
        AppError::OutOfStock(format!("No available keys for product {}", product_id))
    })
}

/// Atomically claim a specific key by value.
///
/// The `is_used = 0` guard is part of the UPDATE itself. When it does not
/// match, a follow-up read only classifies the failure.
pub fn claim_license_key_by_value(
    conn: &Connection,
    product_id: &str,
    value: &str,
    email: &str,
    intent_id: Option<&str>,
) -> Result<LicenseKey> {
    let value = value.trim();
    let now = now();
    let claimed: Option<LicenseKey> = query_one(
        conn,
        &format!(
            "UPDATE license_keys
             SET is_used = 1, used_by_email = ?3, used_at = ?4, purchase_intent_id = ?5
             WHERE value = ?1 AND product_id = ?2 AND is_used = 0
             RETURNING {}",
            LICENSE_KEY_COLS
        ),
        &[&value, &product_id, &email, &now, &intent_id],
    )?;

    if let Some(key) = claimed {
        return Ok(key);
    }

    match get_license_key_by_value(conn, value)? {
        Some(key) if key.product_id == product_id => Err(AppError::AlreadyUsed(format!(
            "Key {} has already been claimed",
            value
        ))),
        _ => Err(AppError::NotFound("Key not found for this product".into())),
    }
}

pub fn get_license_key_by_id(conn: &Connection, id: &str) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!("SELECT {} FROM license_keys WHERE id = ?1", LICENSE_KEY_COLS),
        &[&id],
    )
}

pub fn get_license_key_by_value(conn: &Connection, value: &str) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!("SELECT {} FROM license_keys WHERE value = ?1", LICENSE_KEY_COLS),
        &[&value],
    )
}

/// List keys, newest upload first.
pub fn list_license_keys(
    conn: &Connection,
    product_id: Option<&str>,
    availability: KeyAvailability,
) -> Result<Vec<LicenseKey>> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut values: Vec<&dyn ToSql> = Vec::new();

    if let Some(product_id) = product_id.as_ref() {
        conditions.push("product_id = ?");
        values.push(product_id);
    }
    match availability {
        KeyAvailability::All => {}
        KeyAvailability::Available => conditions.push("is_used = 0"),
        KeyAvailability::Used => conditions.push("is_used = 1"),
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_keys {} ORDER BY created_at DESC, rowid DESC",
            LICENSE_KEY_COLS, where_clause
        ),
        &values,
    )
}

/// Every claimed key. The subscription view aggregates over this full set.
pub fn list_used_license_keys(conn: &Connection) -> Result<Vec<LicenseKey>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_keys WHERE is_used = 1 ORDER BY used_at DESC",
            LICENSE_KEY_COLS
        ),
        &[],
    )
}

pub fn count_available_keys(conn: &Connection, product_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM license_keys WHERE product_id = ?1 AND is_used = 0",
        params![product_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Stock levels per product.
pub fn get_inventory(conn: &Connection) -> Result<Vec<ProductInventory>> {
    query_all(
        conn,
        "SELECT product_id,
                SUM(CASE WHEN is_used = 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN is_used = 1 THEN 1 ELSE 0 END)
         FROM license_keys
         GROUP BY product_id
         ORDER BY product_id",
        &[],
    )
}

const RELEASE_SQL: &str = "UPDATE license_keys
     SET is_used = 0, used_by_email = NULL, used_at = NULL,
         expiration_date = NULL, purchase_intent_id = NULL
     WHERE id = ?1 AND is_used = 1";

/// Return a used key to the pool, clearing every usage field in one statement.
///
/// Returns `Ok(false)` if the key was already available.
pub fn release_license_key(conn: &Connection, id: &str) -> Result<bool> {
    if conn.execute(RELEASE_SQL, params![id])? > 0 {
        return Ok(true);
    }
    match get_license_key_by_id(conn, id)? {
        Some(_) => Ok(false),
        None => Err(AppError::NotFound("License key not found".into())),
    }
}

/// Release several keys in one transaction. Unknown or already available ids
/// are skipped; returns how many keys went back to the pool.
pub fn release_license_keys(conn: &mut Connection, ids: &[String]) -> Result<usize> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let mut released = 0;
    {
        let mut stmt = tx.prepare(RELEASE_SQL)?;
        for id in ids {
            released += stmt.execute(params![id])?;
        }
    }
    tx.commit()?;
    Ok(released)
}

/// Delete an available key. Fails with `InUse` if the key is claimed.
pub fn delete_license_key(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM license_keys WHERE id = ?1 AND is_used = 0",
        params![id],
    )?;
    if deleted > 0 {
        return Ok(());
    }
    match get_license_key_by_id(conn, id)? {
        Some(_) => Err(AppError::InUse(format!(
            "Key {} is claimed; release it before deleting",
            id
        ))),
        None => Err(AppError::NotFound("License key not found".into())),
    }
}

/// Delete several available keys in one transaction.
///
/// If any target is claimed, nothing is deleted and the error names every
/// claimed id. Unknown ids do not fail the call and are reported back.
pub fn delete_license_keys(conn: &mut Connection, ids: &[String]) -> Result<RemoveKeysOutcome> {
    let mut seen = HashSet::new();
    let ids: Vec<&String> = ids.iter().filter(|&id| seen.insert(id)).collect();

    // Use IMMEDIATE so the used check and the delete see the same snapshot
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let mut removed = 0;
    let mut not_found = Vec::new();
    let mut in_use = Vec::new();
    {
        let mut delete = tx.prepare("DELETE FROM license_keys WHERE id = ?1 AND is_used = 0")?;
        let mut lookup = tx.prepare("SELECT is_used FROM license_keys WHERE id = ?1")?;
        for id in ids {
            if delete.execute(params![id])? > 0 {
                removed += 1;
                continue;
            }
            let used: Option<bool> = lookup
                .query_row(params![id], |row| row.get::<_, i32>(0).map(|v| v != 0))
                .optional()?;
            match used {
                Some(_) => in_use.push(id.clone()),
                None => not_found.push(id.clone()),
            }
        }
    }

    if !in_use.is_empty() {
        // Dropping the transaction rolls back the deletes above
        return Err(AppError::InUse(format!(
            "Keys still claimed: {}",
            in_use.join(", ")
        )));
    }

    tx.commit()?;
    Ok(RemoveKeysOutcome { removed, not_found })
}

/// Set or clear the expiration override on a claimed key.
///
/// The override must fall between the claim instant and
/// `MAX_EXPIRATION_OVERRIDE_DAYS` after it. The bound is checked inside the
/// UPDATE against the stored `used_at`, so a concurrent release cannot slip
/// an unchecked value in.
pub fn set_license_key_expiration(
    conn: &Connection,
    id: &str,
    expiration_date: Option<i64>,
) -> Result<LicenseKey> {
    let max_span = MAX_EXPIRATION_OVERRIDE_DAYS * SECONDS_PER_DAY;
    let updated: Option<LicenseKey> = query_one(
        conn,
        &format!(
            "UPDATE license_keys SET expiration_date = ?2
             WHERE id = ?1 AND is_used = 1
               AND (?2 IS NULL OR (?2 >= used_at AND ?2 - used_at <= ?3))
             RETURNING {}",
            LICENSE_KEY_COLS
        ),
        &[&id, &expiration_date, &max_span],
    )?;
    if let Some(key) = updated {
        return Ok(key);
    }
    match get_license_key_by_id(conn, id)? {
        Some(key) if !key.is_used => Err(AppError::BadRequest(
            "Only claimed keys have an expiration date".into(),
        )),
        Some(_) => Err(AppError::BadRequest(format!(
            "Expiration date must be between the claim time and {} days after it",
            MAX_EXPIRATION_OVERRIDE_DAYS
        ))),
        None => Err(AppError::NotFound("License key not found".into())),
    }
}

// ============ Purchase Intents ============

pub fn create_purchase_intent(
    conn: &Connection,
    input: &CreatePurchaseIntent,
) -> Result<PurchaseIntent> {
    let intent = PurchaseIntent {
        id: gen_id(),
        created_at: now(),
        product_id: input.product_id.clone(),
        product_title: input.product_title.clone(),
        country: input.country.clone(),
        email: input.email.trim().to_string(),
        phone_number: input.phone_number.clone(),
    };
    insert_purchase_intent(conn, &intent)?;
    Ok(intent)
}

/// Store a fully formed intent (id and timestamp chosen by the caller).
pub fn insert_purchase_intent(conn: &Connection, intent: &PurchaseIntent) -> Result<()> {
    conn.execute(
        "INSERT INTO purchase_intents (id, created_at, product_id, product_title, country, email, phone_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &intent.id,
            intent.created_at,
            &intent.product_id,
            &intent.product_title,
            &intent.country,
            &intent.email,
            &intent.phone_number
        ],
    )?;
    Ok(())
}

/// Intents created at or after `since`, newest first. `None` reads every intent.
pub fn list_purchase_intents_since(
    conn: &Connection,
    since: Option<i64>,
) -> Result<Vec<PurchaseIntent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM purchase_intents
             WHERE ?1 IS NULL OR created_at >= ?1
             ORDER BY created_at DESC, id DESC",
            PURCHASE_INTENT_COLS
        ),
        &[&since],
    )
}

pub fn delete_purchase_intent(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM purchase_intents WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Ids of intents that some key has been claimed for.
pub fn list_completed_intent_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT purchase_intent_id FROM license_keys
         WHERE purchase_intent_id IS NOT NULL",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}
