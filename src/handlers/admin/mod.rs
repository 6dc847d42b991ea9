mod intents;
mod keys;
mod subscriptions;

pub use intents::*;
pub use keys::*;
pub use subscriptions::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Key inventory
        .route("/inventory", get(get_inventory))
        .route("/products/{product_id}/keys", post(add_keys))
        .route("/products/{product_id}/claim", post(claim_key))
        .route("/products/{product_id}/claim-manual", post(claim_key_manual))
        .route("/keys", get(list_keys))
        .route("/keys/release", post(release_keys))
        .route("/keys/delete", post(delete_keys))
        .route("/keys/{id}", get(get_key))
        .route("/keys/{id}", delete(delete_key))
        .route("/keys/{id}/release", post(release_key))
        .route("/keys/{id}/expiration", put(set_key_expiration))
        // Subscriptions (read model over claimed keys)
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/summary", get(get_subscription_summary))
        // Purchase intents
        .route("/intents", get(list_intents))
        .route("/intents/{id}", delete(delete_intent))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
