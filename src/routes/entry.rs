use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::{
    edge::session_guard,
    middleware::{catch_panic_layer, json_error_middleware},
    state::AppState,
};

use super::{api, pages};

pub const API_PREFIX: &str = "/api/v1";

/// API under [`API_PREFIX`] plus the HTML pages, behind the session guard.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(API_PREFIX, api::router(state.clone()))
        .merge(pages::router(state.clone()))
        .layer(middleware::from_fn_with_state(state, session_guard))
}

/// [`router`] with the error, panic and trace layers the server runs with.
pub fn app(state: Arc<AppState>) -> Router {
    router(state)
        .layer(middleware::from_fn(json_error_middleware))
        .layer(catch_panic_layer())
        .layer(TraceLayer::new_for_http())
}
