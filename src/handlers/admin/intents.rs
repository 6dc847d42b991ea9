use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::intents::IntentChange;
use crate::models::{IntentStatus, PurchaseIntentWithStatus};

#[derive(Debug, Deserialize)]
pub struct IntentPath {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteIntentResponse {
    pub deleted: bool,
}

/// GET /intents
/// Live ledger contents, newest first, with completion derived from claimed keys
pub async fn list_intents(
    State(state): State<AppState>,
) -> Result<Json<Vec<PurchaseIntentWithStatus>>> {
    let conn = state.db.get()?;
    let completed = queries::list_completed_intent_ids(&conn)?;

    let intents = state
        .intents
        .ledger()
        .snapshot()
        .into_iter()
        .map(|intent| {
            let status = if completed.contains(&intent.id) {
                IntentStatus::Completed
            } else {
                IntentStatus::Pending
            };
            PurchaseIntentWithStatus { intent, status }
        })
        .collect();

    Ok(Json(intents))
}

/// DELETE /intents/{id}
pub async fn delete_intent(
    State(state): State<AppState>,
    Path(path): Path<IntentPath>,
) -> Result<Json<DeleteIntentResponse>> {
    let conn = state.db.get()?;
    if !queries::delete_purchase_intent(&conn, &path.id)? {
        return Err(AppError::NotFound("Purchase intent not found".into()));
    }

    // Apply locally as well so a poll-only deployment drops it too
    state.intents.ledger().remove(&path.id);
    state
        .intent_events
        .publish(IntentChange::Deleted(path.id.clone()));

    tracing::info!("Deleted purchase intent {}", path.id);

    Ok(Json(DeleteIntentResponse { deleted: true }))
}
