pub mod admin;
pub mod public;

use axum::Router;

use crate::db::AppState;

/// Full application router: public storefront routes plus the admin API.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(public::router())
        .merge(admin::router(state))
}
