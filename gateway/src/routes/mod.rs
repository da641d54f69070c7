pub mod api;
pub mod bridge;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the complete application router.
pub fn create_app(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(bridge::create_bridge_router())
        .with_state(state)
}
