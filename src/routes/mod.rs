use axum::Router;

use crate::state::SharedState;

/// Admin-only match control.
pub mod admin;
/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Liveness.
pub mod health;
/// Registration, scanning and the live view.
pub mod public;
/// Live event stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(public::router())
        .merge(admin::router(state.clone()))
        .merge(docs::router())
        .with_state(state)
}
