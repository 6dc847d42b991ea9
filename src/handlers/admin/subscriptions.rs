use axum::extract::State;
use chrono::Utc;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{SubscriptionFilter, SubscriptionRecord, SubscriptionSummary};
use crate::subscriptions::{build_subscription_view, summarize};

/// GET /subscriptions?product_id=&search=&status=
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(filter): Query<SubscriptionFilter>,
) -> Result<Json<Vec<SubscriptionRecord>>> {
    let conn = state.db.get()?;
    // Load every claimed key so per-customer counts ignore the filter
    let keys = queries::list_used_license_keys(&conn)?;
    Ok(Json(build_subscription_view(
        &keys,
        &filter,
        Utc::now().timestamp(),
    )))
}

/// GET /subscriptions/summary
pub async fn get_subscription_summary(
    State(state): State<AppState>,
) -> Result<Json<SubscriptionSummary>> {
    let conn = state.db.get()?;
    let keys = queries::list_used_license_keys(&conn)?;
    Ok(Json(summarize(&keys, Utc::now().timestamp())))
}
