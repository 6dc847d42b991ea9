use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    AddKeysOutcome, ClaimKey, KeyAvailability, LicenseKey, ProductInventory, RemoveKeysOutcome,
};
use crate::util::parse_key_blob;

#[derive(Debug, Deserialize)]
pub struct ProductPath {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyPath {
    pub id: String,
}

/// Request body for a bulk key upload
#[derive(Debug, Deserialize)]
pub struct AddKeysBody {
    /// Newline-separated key values
    pub keys: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimManualBody {
    pub value: String,
    pub email: String,
    #[serde(default)]
    pub intent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeyIdsBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKeysQuery {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub availability: KeyAvailability,
}

#[derive(Debug, Deserialize)]
pub struct SetExpirationBody {
    /// Unix timestamp, or null to fall back to 30 days after claim
    pub expiration_date: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct ReleaseManyResponse {
    pub released: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

fn require_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid customer email is required".into()));
    }
    Ok(email)
}

fn require_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(AppError::BadRequest("At least one key id is required".into()));
    }
    if ids.len() > 1000 {
        return Err(AppError::BadRequest("At most 1000 keys per request".into()));
    }
    Ok(())
}

/// POST /products/{product_id}/keys
/// Upload keys for a product; values that already exist are skipped
pub async fn add_keys(
    State(state): State<AppState>,
    Path(path): Path<ProductPath>,
    Json(body): Json<AddKeysBody>,
) -> Result<Json<AddKeysOutcome>> {
    let values = parse_key_blob(&body.keys);
    if values.is_empty() {
        return Err(AppError::BadRequest("No keys provided".into()));
    }

    let mut conn = state.db.get()?;
    let outcome = queries::add_license_keys(&mut conn, &path.product_id, &values)?;

    tracing::info!(
        "Added {} key(s) to product {} ({} duplicate(s) skipped)",
        outcome.inserted,
        path.product_id,
        outcome.skipped
    );

    Ok(Json(outcome))
}

/// POST /products/{product_id}/claim
/// Hand the oldest available key to a customer
pub async fn claim_key(
    State(state): State<AppState>,
    Path(path): Path<ProductPath>,
    Json(body): Json<ClaimKey>,
) -> Result<Json<LicenseKey>> {
    let email = require_email(&body.email)?;
    let conn = state.db.get()?;

    let key = queries::claim_license_key(
        &conn,
        &path.product_id,
        email,
        body.intent_id.as_deref(),
    )
    .inspect_err(|e| {
        if matches!(e, AppError::OutOfStock(_)) {
            tracing::warn!("Claim failed: product {} is out of stock", path.product_id);
        }
    })?;

    tracing::info!(
        "Claimed key {} for product {} (intent: {:?})",
        key.id,
        path.product_id,
        key.purchase_intent_id
    );

    Ok(Json(key))
}

/// POST /products/{product_id}/claim-manual
/// Claim a specific key chosen by the operator
pub async fn claim_key_manual(
    State(state): State<AppState>,
    Path(path): Path<ProductPath>,
    Json(body): Json<ClaimManualBody>,
) -> Result<Json<LicenseKey>> {
    let email = require_email(&body.email)?;
    if body.value.trim().is_empty() {
        return Err(AppError::BadRequest("Key value is required".into()));
    }

    let conn = state.db.get()?;
    let key = queries::claim_license_key_by_value(
        &conn,
        &path.product_id,
        &body.value,
        email,
        body.intent_id.as_deref(),
    )?;

    tracing::info!(
        "Manually claimed key {} for product {}",
        key.id,
        path.product_id
    );

    Ok(Json(key))
}

/// GET /keys
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<LicenseKey>>> {
    let conn = state.db.get()?;
    let keys = queries::list_license_keys(&conn, query.product_id.as_deref(), query.availability)?;
    Ok(Json(keys))
}

/// GET /keys/{id}
pub async fn get_key(
    State(state): State<AppState>,
    Path(path): Path<KeyPath>,
) -> Result<Json<LicenseKey>> {
    let conn = state.db.get()?;
    let key = queries::get_license_key_by_id(&conn, &path.id)?
        .ok_or_else(|| AppError::NotFound("License key not found".into()))?;
    Ok(Json(key))
}

/// POST /keys/{id}/release
/// Return a claimed key to the pool
pub async fn release_key(
    State(state): State<AppState>,
    Path(path): Path<KeyPath>,
) -> Result<Json<ReleaseResponse>> {
    let conn = state.db.get()?;
    let released = queries::release_license_key(&conn, &path.id)?;

    if released {
        tracing::info!("Released key {} back to the pool", path.id);
    }

    Ok(Json(ReleaseResponse { released }))
}

/// POST /keys/release
pub async fn release_keys(
    State(state): State<AppState>,
    Json(body): Json<KeyIdsBody>,
) -> Result<Json<ReleaseManyResponse>> {
    require_ids(&body.ids)?;

    let mut conn = state.db.get()?;
    let released = queries::release_license_keys(&mut conn, &body.ids)?;

    tracing::info!("Released {} of {} requested key(s)", released, body.ids.len());

    Ok(Json(ReleaseManyResponse { released }))
}

/// DELETE /keys/{id}
pub async fn delete_key(
    State(state): State<AppState>,
    Path(path): Path<KeyPath>,
) -> Result<Json<DeleteResponse>> {
    let conn = state.db.get()?;
    queries::delete_license_key(&conn, &path.id)?;

    tracing::info!("Deleted key {}", path.id);

    Ok(Json(DeleteResponse { deleted: true }))
}

/// POST /keys/delete
/// Delete several available keys; fails without deleting anything if any is claimed
pub async fn delete_keys(
    State(state): State<AppState>,
    Json(body): Json<KeyIdsBody>,
) -> Result<Json<RemoveKeysOutcome>> {
    require_ids(&body.ids)?;

    let mut conn = state.db.get()?;
    let outcome = queries::delete_license_keys(&mut conn, &body.ids)?;

    tracing::info!(
        "Deleted {} key(s) ({} not found)",
        outcome.removed,
        outcome.not_found.len()
    );

    Ok(Json(outcome))
}

/// PUT /keys/{id}/expiration
/// Override (or clear the override of) a claimed key's expiry
pub async fn set_key_expiration(
    State(state): State<AppState>,
    Path(path): Path<KeyPath>,
    Json(body): Json<SetExpirationBody>,
) -> Result<Json<LicenseKey>> {
    let conn = state.db.get()?;
    let key = queries::set_license_key_expiration(&conn, &path.id, body.expiration_date)?;

    tracing::info!(
        "Set expiration of key {} to {:?}",
        key.id,
        key.expiration_date
    );

    Ok(Json(key))
}

/// GET /inventory
pub async fn get_inventory(State(state): State<AppState>) -> Result<Json<Vec<ProductInventory>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::get_inventory(&conn)?))
}
