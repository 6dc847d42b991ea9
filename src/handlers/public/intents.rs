use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::intents::IntentChange;
use crate::models::{CreatePurchaseIntent, PurchaseIntent};

/// POST /intents
/// Record a purchase request from the storefront and announce it on the push channel
pub async fn create_intent(
    State(state): State<AppState>,
    Json(body): Json<CreatePurchaseIntent>,
) -> Result<Json<PurchaseIntent>> {
    if body.product_id.trim().is_empty() || body.product_title.trim().is_empty() {
        return Err(AppError::BadRequest("Product id and title are required".into()));
    }
    if !body.email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }

    let conn = state.db.get()?;
    let intent = queries::create_purchase_intent(&conn, &body)?;

    tracing::info!(
        "Recorded purchase intent {} for product {}",
        intent.id,
        intent.product_id
    );

    // Publish only after the row is stored, so the poller and the push
    // listener always agree on what exists
    state
        .intent_events
        .publish(IntentChange::Inserted(intent.clone()));

    Ok(Json(intent))
}
