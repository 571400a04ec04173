//! Route modules, one per resource.

pub mod health;
pub mod segments;
pub mod streams;
pub mod system;

use axum::Router;

use crate::api::server::AppState;

/// Assemble the full router from each resource's sub-router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(streams::router())
        .merge(segments::router())
        .merge(system::router())
        .with_state(state)
}
