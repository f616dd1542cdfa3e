use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::{
        match_view::MatchView,
        public::{QrCodesQuery, QrCodesResponse, RegisterPlayerRequest, ScanRequest, ScanResponse},
    },
    error::AppError,
    qr::{QrFormat, QrStats},
    services::match_service,
    state::{SharedState, match_state::PlayerRef},
};

/// Endpoints used by player devices and scoreboards.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/match", get(get_match))
        .route("/match/stats", get(get_stats))
        .route("/qr-codes", get(get_qr_codes))
        .route("/players", post(register_player))
        .route("/scans", post(submit_scan))
}

#[utoipa::path(
    get,
    path = "/match",
    tag = "match",
    responses((status = 200, description = "Current match view", body = MatchView))
)]
/// Return the derived view of the live match.
pub async fn get_match(State(state): State<SharedState>) -> Json<MatchView> {
    Json(match_service::view(&state))
}

#[utoipa::path(
    get,
    path = "/match/stats",
    tag = "match",
    responses((status = 200, description = "Scan ledger statistics", body = QrStats))
)]
/// Aggregate the scan ledger by color and payload format.
pub async fn get_stats(State(state): State<SharedState>) -> Json<QrStats> {
    Json(match_service::stats(&state))
}

#[utoipa::path(
    get,
    path = "/qr-codes",
    tag = "match",
    params(QrCodesQuery),
    responses((status = 200, description = "Official payloads to print", body = QrCodesResponse))
)]
/// List the official payloads of one grammar.
pub async fn get_qr_codes(Query(query): Query<QrCodesQuery>) -> Json<QrCodesResponse> {
    Json(match_service::qr_codes(
        query.format.unwrap_or(QrFormat::Compact),
    ))
}

#[utoipa::path(
    post,
    path = "/players",
    tag = "match",
    request_body = RegisterPlayerRequest,
    responses(
        (status = 200, description = "Player registered on this session", body = PlayerRef),
        (status = 400, description = "Blank name or unknown team"),
        (status = 409, description = "Team is full")
    )
)]
/// Join a team as this session's player.
pub async fn register_player(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterPlayerRequest>,
) -> Result<Json<PlayerRef>, AppError> {
    payload.validate()?;
    let player = match_service::register_player(&state, &payload.name, &payload.team)?;
    Ok(Json(player))
}

#[utoipa::path(
    post,
    path = "/scans",
    tag = "match",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan scored, or reported invalid", body = ScanResponse),
        (status = 400, description = "Unknown team"),
        (status = 409, description = "Already scanned, match not active, or no team known")
    )
)]
/// Credit a scanned QR payload.
pub async fn submit_scan(
    State(state): State<SharedState>,
    Json(payload): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let response = match_service::scan(&state, &payload.payload, payload.team.as_deref())?;
    Ok(Json(response))
}
