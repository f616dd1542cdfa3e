//! DTO definitions used by the player-facing REST API.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::validation::validate_player_name,
    qr::{QrColor, QrFormat},
    state::match_state::TeamId,
};

/// Join a team from this session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RegisterPlayerRequest {
    /// Display name, trimmed before use.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    /// `blue`, `red`, `Azul` or `Vermelha` (case-insensitive).
    pub team: String,
}

/// Submit a scanned payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// Raw text read from the marker.
    pub payload: String,
    /// Team to credit; defaults to the team of the registered player.
    #[serde(default)]
    pub team: Option<String>,
}

/// What happened to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScanResult {
    /// Points were credited.
    Scored,
    /// The payload matches no grammar.
    Invalid,
}

/// Response to [`ScanRequest`]. Invalid payloads are a normal outcome, not an error.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScanResponse {
    /// Scored or invalid.
    pub outcome: ScanResult,
    /// Credited team.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
    /// Marker color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<QrColor>,
    /// Points credited.
    pub points: i32,
    /// Ledger entry recorded for the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    /// Score of the credited team after the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_score: Option<i32>,
}

/// Query of `GET /qr-codes`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QrCodesQuery {
    /// Payload grammar to print; compact when omitted.
    pub format: Option<QrFormat>,
}

/// Official payloads of one grammar, one per marker color.
#[derive(Debug, Serialize, ToSchema)]
pub struct QrCodesResponse {
    /// Grammar the payloads are printed in.
    pub format: QrFormat,
    /// One entry per color.
    pub payloads: Vec<QrPayload>,
}

/// A printable marker.
#[derive(Debug, Serialize, ToSchema)]
pub struct QrPayload {
    /// Marker color.
    pub color: QrColor,
    /// Points the marker is worth.
    pub points: i32,
    /// Text to encode in the QR code.
    pub payload: String,
}
