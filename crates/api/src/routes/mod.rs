pub mod dispatcher;
pub mod health;
pub mod messages;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(messages::router())
        .merge(dispatcher::router())
        .with_state(state)
}
