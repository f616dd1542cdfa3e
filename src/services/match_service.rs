//! Controller operations behind the player and admin routes. Each one maps to
//! one atomic store batch, so observers never see half of an operation.

use std::time::SystemTime;

use tracing::{debug, info};

use crate::{
    dto::{
        admin::ResetScope,
        export::MatchExport,
        match_view::MatchView,
        public::{QrCodesResponse, QrPayload, ScanResponse, ScanResult},
    },
    error::ServiceError,
    qr::{self, QrCode, QrColor, QrFormat, QrStats},
    state::{
        AppState,
        lifecycle::{MatchEvent, next_status},
        match_state::{MatchStatus, PlayerRef, TeamId, Teams},
        store::{Action, Origin},
    },
};

fn parse_team(value: &str) -> Result<TeamId, ServiceError> {
    Ok(value.parse::<TeamId>()?)
}

fn clean_name(name: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be blank".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Join `team` as this session's player.
pub fn register_player(
    state: &AppState,
    name: &str,
    team: &str,
) -> Result<PlayerRef, ServiceError> {
    let name = clean_name(name)?;
    let team = parse_team(team)?;
    let player = PlayerRef {
        name: name.clone(),
        team,
    };

    state.store().dispatch_batch(
        Origin::Local,
        [
            Action::AddPlayer { name, team },
            Action::SetCurrentPlayer(Some(player.clone())),
        ],
    )?;
    info!(player = %player.name, %team, "player registered");
    Ok(player)
}

/// Admin add; the session's own player is left untouched.
pub fn add_player(state: &AppState, name: &str, team: &str) -> Result<Teams, ServiceError> {
    let name = clean_name(name)?;
    let team = parse_team(team)?;
    state.store().dispatch(Action::AddPlayer { name, team })?;
    Ok(state.store().read(|current| current.teams.clone()))
}

/// Remove every roster entry named `name` from `team`.
pub fn remove_player(state: &AppState, team: &str, name: &str) -> Result<Teams, ServiceError> {
    let team = parse_team(team)?;
    let name = name.trim();

    state.store().dispatch_from(Origin::Local, |current| {
        let mut teams = current.teams.clone();
        let roster = &mut teams.get_mut(team).players;
        let before = roster.len();
        roster.retain(|player| player != name);
        if roster.len() == before {
            return Err(ServiceError::NotFound(format!(
                "player `{name}` is not on team `{team}`"
            )));
        }

        let mut actions = vec![Action::SetTeams(teams)];
        if current
            .current_player
            .as_ref()
            .is_some_and(|player| player.team == team && player.name == name)
        {
            actions.push(Action::SetCurrentPlayer(None));
        }
        Ok(actions)
    })?;

    info!(player = %name, %team, "player removed");
    Ok(state.store().read(|current| current.teams.clone()))
}

/// Credit a scanned payload.
///
/// Unrecognised payloads are reported as [`ScanResult::Invalid`] without
/// touching the store. The team defaults to this session's player.
pub fn scan(
    state: &AppState,
    payload: &str,
    team: Option<&str>,
) -> Result<ScanResponse, ServiceError> {
    let Some(code) = QrCode::parse(payload.trim()) else {
        debug!(payload, "invalid QR payload");
        return Ok(ScanResponse {
            outcome: ScanResult::Invalid,
            team: None,
            color: None,
            points: 0,
            normalized: None,
            team_score: None,
        });
    };

    let team = match team {
        Some(team) => parse_team(team)?,
        None => state
            .store()
            .read(|current| current.current_player.as_ref().map(|player| player.team))
            .ok_or_else(|| {
                ServiceError::InvalidState(
                    "no team given and no player registered on this session".into(),
                )
            })?,
    };

    let normalized = code.normalized();
    let points = code.points();
    state.store().dispatch_from(Origin::Local, |current| {
        if current.status != MatchStatus::Active {
            return Err(ServiceError::InvalidState(format!(
                "scans are only accepted while the match is active (currently {})",
                current.status
            )));
        }
        Ok(vec![Action::AddScore {
            team,
            points,
            qr_code: Some(normalized.clone()),
        }])
    })?;

    let team_score = state.store().read(|current| current.teams.get(team).score);
    info!(code = %normalized, %team, points, team_score, "QR code scored");
    Ok(ScanResponse {
        outcome: ScanResult::Scored,
        team: Some(team),
        color: Some(code.color),
        points,
        normalized: Some(normalized),
        team_score: Some(team_score),
    })
}

/// Manual score correction; returns the team's new score.
pub fn adjust_score(state: &AppState, team: &str, delta: i32) -> Result<i32, ServiceError> {
    let team = parse_team(team)?;
    state.store().dispatch(Action::AddScore {
        team,
        points: delta,
        qr_code: None,
    })?;
    let score = state.store().read(|current| current.teams.get(team).score);
    info!(%team, delta, score, "score adjusted");
    Ok(score)
}

fn transition(state: &AppState, event: MatchEvent) -> Result<MatchStatus, ServiceError> {
    let mut reached = MatchStatus::Waiting;
    state.store().dispatch_from(Origin::Local, |current| {
        reached = next_status(current.status, event, current.teams.total_players())?;
        Ok::<_, ServiceError>([Action::SetStatus(reached)])
    })?;
    Ok(reached)
}

/// Start the countdown. Needs at least one player.
pub fn start_match(state: &AppState) -> Result<(), ServiceError> {
    transition(state, MatchEvent::Start)?;
    info!("match started");
    Ok(())
}

/// End the running match early.
pub fn stop_match(state: &AppState) -> Result<(), ServiceError> {
    transition(state, MatchEvent::Stop)?;
    info!("match stopped");
    Ok(())
}

/// Prepare a new round: waiting status, full countdown, zero scores, empty ledger.
///
/// [`ResetScope::Everything`] also empties both rosters and forgets this
/// session's player.
pub fn reset_match(state: &AppState, scope: ResetScope) -> Result<(), ServiceError> {
    let duration = state.config().match_duration_secs;

    state.store().dispatch_from(Origin::Local, |current| {
        let status = next_status(current.status, MatchEvent::Reset, 0)?;
        let teams = match scope {
            ResetScope::Scores => current.teams.with_scores_cleared(),
            ResetScope::Everything => Teams::default(),
        };

        let mut actions = vec![
            Action::SetStatus(status),
            Action::SetTimeRemaining(duration),
            Action::SetTeams(teams),
            Action::ResetScannedCodes,
        ];
        if scope == ResetScope::Everything {
            actions.push(Action::SetCurrentPlayer(None));
        }
        Ok::<_, ServiceError>(actions)
    })?;

    info!(?scope, "match reset");
    Ok(())
}

/// Override the countdown; refused while the match runs.
pub fn set_match_duration(state: &AppState, seconds: u32) -> Result<(), ServiceError> {
    if seconds == 0 {
        return Err(ServiceError::InvalidInput(
            "match duration must be at least one second".into(),
        ));
    }

    state.store().dispatch_from(Origin::Local, |current| {
        if current.status == MatchStatus::Active {
            return Err(ServiceError::InvalidState(
                "cannot change the countdown while the match is running".into(),
            ));
        }
        Ok(vec![Action::SetTimeRemaining(seconds)])
    })?;

    info!(seconds, "countdown overridden");
    Ok(())
}

/// Export snapshot stamped with `at`.
pub fn export(state: &AppState, at: SystemTime) -> MatchExport {
    state.store().read(|current| MatchExport::new(current, at))
}

/// Statistics over the scan ledger.
pub fn stats(state: &AppState) -> QrStats {
    state
        .store()
        .read(|current| qr::compute_stats(&current.scanned_codes))
}

/// Derived view of the current state.
pub fn view(state: &AppState) -> MatchView {
    let sync = state.sync_status();
    let degraded = state.is_degraded();
    state
        .store()
        .read(|current| MatchView::new(current, sync, degraded))
}

/// The official payloads to print for `format`.
pub fn qr_codes(format: QrFormat) -> QrCodesResponse {
    let payloads = QrColor::ALL
        .into_iter()
        .zip(qr::canonical_payloads(format))
        .map(|(color, payload)| QrPayload {
            color,
            points: color.points(),
            payload,
        })
        .collect();
    QrCodesResponse { format, payloads }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{SharedState, store::ActionError},
    };

    fn session() -> SharedState {
        AppState::new(AppConfig::default())
    }

    fn running_session() -> SharedState {
        let state = session();
        register_player(&state, "Ana", "blue").unwrap();
        add_player(&state, "Bea", "Vermelha").unwrap();
        start_match(&state).unwrap();
        state
    }

    #[test]
    fn registration_trims_and_sets_current_player() {
        let state = session();
        let player = register_player(&state, "  Ana ", "Azul").unwrap();
        assert_eq!(player.name, "Ana");
        assert_eq!(player.team, TeamId::Blue);

        let snapshot = state.store().snapshot();
        assert_eq!(snapshot.teams.blue.players, vec!["Ana"]);
        assert_eq!(snapshot.current_player, Some(player));
    }

    #[test]
    fn registration_rejects_bad_input() {
        let state = session();
        assert!(matches!(
            register_player(&state, "   ", "blue"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            register_player(&state, "Ana", "green"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(state.store().snapshot().teams.total_players(), 0);
    }

    #[test]
    fn full_roster_leaves_current_player_unset() {
        let state = session();
        for name in ["a", "b", "c", "d", "e"] {
            add_player(&state, name, "red").unwrap();
        }
        let err = register_player(&state, "f", "red").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Action(ActionError::RosterFull { .. })
        ));
        assert_eq!(state.store().snapshot().current_player, None);
    }

    #[test]
    fn start_requires_players() {
        let state = session();
        assert!(start_match(&state).is_err());
        assert_eq!(state.store().snapshot().status, MatchStatus::Waiting);

        add_player(&state, "Ana", "blue").unwrap();
        start_match(&state).unwrap();
        assert_eq!(state.store().snapshot().status, MatchStatus::Active);
        assert!(start_match(&state).is_err());
    }

    #[test]
    fn scan_defaults_to_registered_team() {
        let state = running_session();
        let response = scan(&state, "GAME_QR_ORANGE_002", None).unwrap();
        assert_eq!(response.outcome, ScanResult::Scored);
        assert_eq!(response.team, Some(TeamId::Blue));
        assert_eq!(response.points, 3);
        assert_eq!(response.normalized.as_deref(), Some("GameQrcodeFach:laranja"));
        assert_eq!(response.team_score, Some(3));
    }

    #[test]
    fn invalid_payload_is_an_outcome_not_an_error() {
        let state = running_session();
        let response = scan(&state, "hello world", None).unwrap();
        assert_eq!(response.outcome, ScanResult::Invalid);
        assert_eq!(response.points, 0);
        assert!(state.store().snapshot().scanned_codes.is_empty());
    }

    #[test]
    fn duplicate_scan_is_a_conflict() {
        let state = running_session();
        scan(&state, "GameQrcodeFach:verde", Some("red")).unwrap();
        let err = scan(&state, "GAME_QR_GREEN_777", Some("blue")).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Action(ActionError::DuplicateScan { .. })
        ));
        let snapshot = state.store().snapshot();
        assert_eq!(snapshot.teams.red.score, 1);
        assert_eq!(snapshot.teams.blue.score, 0);
    }

    #[test]
    fn scans_need_an_active_match_and_a_team() {
        let state = session();
        add_player(&state, "Ana", "blue").unwrap();
        assert!(matches!(
            scan(&state, "GameQrcodeFach:verde", Some("blue")),
            Err(ServiceError::InvalidState(_))
        ));

        start_match(&state).unwrap();
        assert!(matches!(
            scan(&state, "GameQrcodeFach:verde", None),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn reset_keeps_rosters_by_default() {
        let state = running_session();
        scan(&state, "GameQrcodeFach:vermelho", None).unwrap();
        set_match_duration(&state, 5).unwrap_err();
        stop_match(&state).unwrap();

        reset_match(&state, ResetScope::Scores).unwrap();
        let snapshot = state.store().snapshot();
        assert_eq!(snapshot.status, MatchStatus::Waiting);
        assert_eq!(snapshot.time_remaining_secs, 600);
        assert_eq!(snapshot.teams.blue.players, vec!["Ana"]);
        assert_eq!(snapshot.teams.blue.score, 0);
        assert!(snapshot.scanned_codes.is_empty());
        assert!(snapshot.current_player.is_some());
    }

    #[test]
    fn reset_everything_clears_rosters() {
        let state = running_session();
        stop_match(&state).unwrap();
        reset_match(&state, ResetScope::Everything).unwrap();

        let snapshot = state.store().snapshot();
        assert_eq!(snapshot.teams, Teams::default());
        assert_eq!(snapshot.current_player, None);
    }

    #[test]
    fn reset_is_refused_while_running() {
        let state = running_session();
        assert!(matches!(
            reset_match(&state, ResetScope::Scores),
            Err(ServiceError::Transition(_))
        ));
    }

    #[test]
    fn removing_a_player_updates_roster_and_session() {
        let state = session();
        register_player(&state, "Ana", "blue").unwrap();
        add_player(&state, "Caio", "blue").unwrap();

        let teams = remove_player(&state, "blue", "Ana").unwrap();
        assert_eq!(teams.blue.players, vec!["Caio"]);
        assert_eq!(state.store().snapshot().current_player, None);

        assert!(matches!(
            remove_player(&state, "blue", "Ana"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn manual_adjustments_never_go_negative() {
        let state = session();
        assert_eq!(adjust_score(&state, "red", 4).unwrap(), 4);
        assert_eq!(adjust_score(&state, "red", -10).unwrap(), 0);
    }

    #[test]
    fn qr_catalog_lists_every_color() {
        let catalog = qr_codes(QrFormat::Legacy);
        let payloads: Vec<_> = catalog.payloads.iter().map(|p| p.payload.as_str()).collect();
        assert_eq!(
            payloads,
            vec!["GAME_QR_GREEN_001", "GAME_QR_ORANGE_002", "GAME_QR_RED_003"]
        );
        assert_eq!(catalog.payloads[2].points, 5);
    }
}
