//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::validate_player_name;

/// How much a reset clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    /// Zero scores, keep rosters.
    #[default]
    Scores,
    /// Zero scores and empty both rosters.
    Everything,
}

/// Optional body of the reset endpoint.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResetRequest {
    /// `scores` unless given.
    #[serde(default)]
    pub scope: ResetScope,
}

/// Override the countdown while the match is not running.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTimeRequest {
    /// New countdown value; must be positive.
    pub seconds: u32,
}

/// Add a player to a roster without registering them on this session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddPlayerRequest {
    /// Display name, trimmed before use.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    /// `blue`, `red`, `Azul` or `Vermelha`.
    pub team: String,
}

/// Manual score correction; negative deltas subtract.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScoreAdjustmentRequest {
    /// Team to adjust.
    pub team: String,
    /// Points to add; negative to subtract.
    pub delta: i32,
}

/// Generic action acknowledgement used by admin endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl ActionResponse {
    /// Wrap `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_scope_defaults_to_scores() {
        let request: ResetRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.scope, ResetScope::Scores);

        let request: ResetRequest = serde_json::from_str(r#"{"scope":"everything"}"#).unwrap();
        assert_eq!(request.scope, ResetScope::Everything);
    }
}
