use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::AppError;
use crate::util::extract_bearer_token;

/// Require `Authorization: Bearer <ADMIN_API_KEY>` on admin routes.
///
/// When no key is configured (dev mode only) every request passes.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.admin_api_key.as_deref() {
        let provided = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
        let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
        if !matches {
            tracing::warn!("Rejected admin request with invalid API key");
            return Err(AppError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}
