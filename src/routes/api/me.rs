use std::sync::Arc;

use axum::{Router, extract::State, routing::get};

use crate::{
    auth::types::UserSummary,
    error::AppError,
    middleware::AuthGuard,
    response::{ApiResult, JsonApiResponse},
    state::AppState,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/me", get(me)).with_state(state)
}

async fn me(State(state): State<Arc<AppState>>, claims: AuthGuard) -> ApiResult<UserSummary> {
    let user = state
        .services()
        .user()
        .find_by_user_id(&claims.sub)
        .await?
        .filter(|user| user.enabled)
        .ok_or_else(|| AppError::unauthorized("Account is not available"))?;
    JsonApiResponse::ok(UserSummary::from(&user))
}
