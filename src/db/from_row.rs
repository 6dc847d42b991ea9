//! Row mapping trait and query helpers.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Construct a type from a database row whose columns follow one of the
/// `*_COLS` constants below.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENSE_KEY_COLS: &str = "id, product_id, value, is_used, used_by_email, used_at, expiration_date, purchase_intent_id, created_at";

pub const PURCHASE_INTENT_COLS: &str =
    "id, created_at, product_id, product_title, country, email, phone_number";

// ============ FromRow Implementations ============

impl FromRow for LicenseKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseKey {
            id: row.get(0)?,
            product_id: row.get(1)?,
            value: row.get(2)?,
            is_used: row.get::<_, i32>(3)? != 0,
            used_by_email: row.get(4)?,
            used_at: row.get(5)?,
            expiration_date: row.get(6)?,
            purchase_intent_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for PurchaseIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PurchaseIntent {
            id: row.get(0)?,
            created_at: row.get(1)?,
            product_id: row.get(2)?,
            product_title: row.get(3)?,
            country: row.get(4)?,
            email: row.get(5)?,
            phone_number: row.get(6)?,
        })
    }
}

impl FromRow for ProductInventory {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let available: i64 = row.get(1)?;
        let used: i64 = row.get(2)?;
        Ok(ProductInventory {
            product_id: row.get(0)?,
            available,
            used,
            total: available + used,
        })
    }
}
