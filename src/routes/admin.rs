use std::time::SystemTime;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use validator::Validate;

use crate::{
    config::SessionRole,
    dto::{
        admin::{
            ActionResponse, AddPlayerRequest, ResetRequest, ScoreAdjustmentRequest,
            SetTimeRequest,
        },
        export::{MatchExport, export_file_name},
    },
    error::AppError,
    services::match_service,
    state::{SharedState, match_state::Teams},
};

/// Admin-only endpoints driving the match lifecycle and rosters.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/match/start", post(start_match))
        .route("/admin/match/stop", post(stop_match))
        .route("/admin/match/reset", post(reset_match))
        .route("/admin/match/time", put(set_time))
        .route("/admin/players", post(add_player))
        .route("/admin/teams/{team}/players/{name}", delete(remove_player))
        .route("/admin/score", post(adjust_score))
        .route("/admin/export", get(export_match))
        .route_layer(middleware::from_fn_with_state(state, require_admin_session))
}

#[utoipa::path(
    post,
    path = "/admin/match/start",
    tag = "admin",
    responses(
        (status = 200, description = "Match started", body = ActionResponse),
        (status = 409, description = "Not waiting, or no players registered")
    )
)]
/// Start the countdown.
pub async fn start_match(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    match_service::start_match(&state)?;
    Ok(Json(ActionResponse::new("match started")))
}

#[utoipa::path(
    post,
    path = "/admin/match/stop",
    tag = "admin",
    responses(
        (status = 200, description = "Match finished", body = ActionResponse),
        (status = 409, description = "Match is not running")
    )
)]
/// End the running match early.
pub async fn stop_match(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    match_service::stop_match(&state)?;
    Ok(Json(ActionResponse::new("match stopped")))
}

#[utoipa::path(
    post,
    path = "/admin/match/reset",
    tag = "admin",
    request_body(content = ResetRequest, description = "Optional; defaults to the `scores` scope"),
    responses(
        (status = 200, description = "Match reset", body = ActionResponse),
        (status = 409, description = "Match is running")
    )
)]
/// Prepare a new round.
pub async fn reset_match(
    State(state): State<SharedState>,
    payload: Option<Json<ResetRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    let scope = payload
        .map(|Json(request)| request.scope)
        .unwrap_or_default();
    match_service::reset_match(&state, scope)?;
    Ok(Json(ActionResponse::new("match reset")))
}

#[utoipa::path(
    put,
    path = "/admin/match/time",
    tag = "admin",
    request_body = SetTimeRequest,
    responses(
        (status = 200, description = "Countdown overridden", body = ActionResponse),
        (status = 400, description = "Zero seconds"),
        (status = 409, description = "Match is running")
    )
)]
/// Override the countdown value.
pub async fn set_time(
    State(state): State<SharedState>,
    Json(payload): Json<SetTimeRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    match_service::set_match_duration(&state, payload.seconds)?;
    Ok(Json(ActionResponse::new(format!(
        "countdown set to {} seconds",
        payload.seconds
    ))))
}

#[utoipa::path(
    post,
    path = "/admin/players",
    tag = "admin",
    request_body = AddPlayerRequest,
    responses(
        (status = 200, description = "Rosters after the add", body = Teams),
        (status = 409, description = "Team is full")
    )
)]
/// Add a player to a roster on someone else's behalf.
pub async fn add_player(
    State(state): State<SharedState>,
    Json(payload): Json<AddPlayerRequest>,
) -> Result<Json<Teams>, AppError> {
    payload.validate()?;
    Ok(Json(match_service::add_player(
        &state,
        &payload.name,
        &payload.team,
    )?))
}

#[utoipa::path(
    delete,
    path = "/admin/teams/{team}/players/{name}",
    tag = "admin",
    params(
        ("team" = String, Path, description = "`blue`, `red`, `Azul` or `Vermelha`"),
        ("name" = String, Path, description = "Player name to remove")
    ),
    responses(
        (status = 200, description = "Rosters after the removal", body = Teams),
        (status = 404, description = "No such player on that team")
    )
)]
/// Remove a player from a roster.
pub async fn remove_player(
    State(state): State<SharedState>,
    Path((team, name)): Path<(String, String)>,
) -> Result<Json<Teams>, AppError> {
    Ok(Json(match_service::remove_player(&state, &team, &name)?))
}

#[utoipa::path(
    post,
    path = "/admin/score",
    tag = "admin",
    request_body = ScoreAdjustmentRequest,
    responses((status = 200, description = "Score adjusted", body = ActionResponse))
)]
/// Add or subtract points manually. Scores never drop below zero.
pub async fn adjust_score(
    State(state): State<SharedState>,
    Json(payload): Json<ScoreAdjustmentRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let score = match_service::adjust_score(&state, &payload.team, payload.delta)?;
    Ok(Json(ActionResponse::new(format!(
        "team {} now has {score} points",
        payload.team
    ))))
}

#[utoipa::path(
    get,
    path = "/admin/export",
    tag = "admin",
    responses((status = 200, description = "Match export as a JSON download", body = MatchExport))
)]
/// Download the current match as JSON.
pub async fn export_match(State(state): State<SharedState>) -> Response {
    let now = SystemTime::now();
    let export = match_service::export(&state, now);
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(now));

    let mut response = Json(export).into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Only admin sessions may drive the match.
async fn require_admin_session(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    match state.config().role {
        SessionRole::Admin => Ok(next.run(req).await),
        SessionRole::Player => Err(AppError::Forbidden(
            "this session is not an admin session".into(),
        )),
    }
}
