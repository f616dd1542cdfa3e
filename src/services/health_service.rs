use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the session is degraded, pinging the document store when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.document_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "document store health check failed");
            }
        }
        None if state.is_degraded() => warn!("document store unavailable (degraded mode)"),
        None => {}
    }

    let sync = state.sync_status();
    if state.is_degraded() {
        HealthResponse::degraded(sync)
    } else {
        HealthResponse::ok(sync)
    }
}
