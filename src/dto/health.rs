use serde::Serialize;
use utoipa::ToSchema;

use crate::services::sync_bridge::SyncStatus;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// State of the remote document mirror.
    pub sync: SyncStatus,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(sync: SyncStatus) -> Self {
        Self {
            status: "ok".to_string(),
            sync,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(sync: SyncStatus) -> Self {
        Self {
            status: "degraded".to_string(),
            sync,
        }
    }
}
