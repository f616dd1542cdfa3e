use std::{sync::Arc, time::Duration};

use qr_hunt_back::{
    config::{AppConfig, SessionRole, StoreBackend},
    dao::match_store::memory::MemoryMatchStore,
    dto::{admin::ResetScope, public::ScanResult},
    qr::{self, QrFormat},
    services::{
        match_service,
        match_timer::{self, MatchTimer, TickOutcome},
        sync_bridge::SyncStatus,
    },
    state::{
        AppState, SharedState,
        match_state::{MatchState, MatchStatus, TeamId},
        store::{Action, ActionError, MatchStore},
    },
};
use tokio::time::{sleep, timeout};

async fn until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn connect(state: &SharedState, remote: &MemoryMatchStore) {
    state.install_document_store(Arc::new(remote.clone())).await;
    let mut sync = state.sync_watcher();
    timeout(
        Duration::from_secs(2),
        sync.wait_for(|status| *status == SyncStatus::Synced),
    )
    .await
    .expect("sync timed out")
    .expect("sync channel closed");
}

async fn synced_session(role: SessionRole, remote: &MemoryMatchStore) -> SharedState {
    let state = AppState::new(AppConfig {
        role,
        store: StoreBackend::Couch,
        ..AppConfig::default()
    });
    connect(&state, remote).await;
    state
}

#[test]
fn scoring_scenario_rejects_the_second_credit() {
    let store = MatchStore::new(MatchState::default());
    store
        .dispatch(Action::AddPlayer {
            name: "Ana".into(),
            team: TeamId::Blue,
        })
        .unwrap();
    store
        .dispatch(Action::AddPlayer {
            name: "Bea".into(),
            team: TeamId::Red,
        })
        .unwrap();
    store.dispatch(Action::SetStatus(MatchStatus::Active)).unwrap();

    let credit = Action::AddScore {
        team: TeamId::Blue,
        points: 1,
        qr_code: Some("GameQrcodeFach:verde".into()),
    };
    store.dispatch(credit.clone()).unwrap();
    let state = store.snapshot();
    assert_eq!(state.teams.blue.score, 1);
    assert_eq!(state.scanned_codes, vec!["GameQrcodeFach:verde"]);

    let err = store.dispatch(credit).unwrap_err();
    assert!(matches!(err, ActionError::DuplicateScan { .. }));
    assert_eq!(store.snapshot().teams.blue.score, 1);
}

#[test]
fn legacy_red_scan_and_its_statistics() {
    let store = MatchStore::new(MatchState::default());
    store
        .dispatch(Action::AddScore {
            team: TeamId::Red,
            points: 5,
            qr_code: Some("GAME_QR_RED_003".into()),
        })
        .unwrap();
    assert_eq!(store.snapshot().teams.red.score, 5);

    let stats = qr::compute_stats(["GAME_QR_RED_003"]);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_color.vermelho, 1);
    assert_eq!(stats.by_color.verde + stats.by_color.laranja, 0);
    assert_eq!(stats.total_points, 5);
    assert_eq!(stats.formats.legacy, 1);
    assert_eq!(stats.formats.compact, 0);
}

#[test]
fn sixth_player_is_refused() {
    let store = MatchStore::new(MatchState::default());
    for name in ["a", "b", "c", "d", "e"] {
        store
            .dispatch(Action::AddPlayer {
                name: name.into(),
                team: TeamId::Red,
            })
            .unwrap();
    }
    let err = store
        .dispatch(Action::AddPlayer {
            name: "f".into(),
            team: TeamId::Red,
        })
        .unwrap_err();
    assert!(matches!(err, ActionError::RosterFull { .. }));
    assert_eq!(store.snapshot().teams.red.players.len(), 5);
}

#[test]
fn resetting_the_ledger_allows_rescanning() {
    let store = MatchStore::new(MatchState::default());
    let credit = || Action::AddScore {
        team: TeamId::Blue,
        points: 3,
        qr_code: Some("GameQrcodeFach:laranja".into()),
    };
    store.dispatch(credit()).unwrap();
    store.dispatch(Action::ResetScannedCodes).unwrap();
    store.dispatch(credit()).unwrap();
    assert_eq!(store.snapshot().teams.blue.score, 6);
}

#[test]
fn every_grammar_normalizes_to_the_same_points() {
    for format in [QrFormat::Compact, QrFormat::Legacy] {
        for (payload, points) in qr::canonical_payloads(format).iter().zip([1, 3, 5]) {
            let normalized = qr::normalize(payload);
            assert_eq!(normalized.points, points, "{payload}");
            let compact = normalized.normalized.unwrap();
            assert_eq!(qr::normalize(&compact).normalized.as_deref(), Some(compact.as_str()));
        }
    }
}

#[test]
fn timer_ticks_to_finished_then_idles() {
    let store = MatchStore::new(MatchState::with_duration(2));
    store.dispatch(Action::SetStatus(MatchStatus::Active)).unwrap();

    assert_eq!(match_timer::tick(&store), TickOutcome::Running(1));
    assert_eq!(match_timer::tick(&store), TickOutcome::Expired);
    assert_eq!(match_timer::tick(&store), TickOutcome::Idle);

    let state = store.snapshot();
    assert_eq!(state.time_remaining_secs, 0);
    assert_eq!(state.status, MatchStatus::Finished);
}

#[tokio::test(start_paused = true)]
async fn a_full_round_through_the_controller() {
    let state = AppState::new(AppConfig {
        match_duration_secs: 3,
        ..AppConfig::default()
    });
    let _timer = MatchTimer::spawn(state.store().clone());

    match_service::register_player(&state, "Ana", "Azul").unwrap();
    match_service::add_player(&state, "Bea", "red").unwrap();
    match_service::start_match(&state).unwrap();

    let scored = match_service::scan(&state, "GAME_QR_ORANGE_002", None).unwrap();
    assert_eq!(scored.outcome, ScanResult::Scored);
    let invalid = match_service::scan(&state, "GameQrcodeFach:azul", None).unwrap();
    assert_eq!(invalid.outcome, ScanResult::Invalid);

    sleep(Duration::from_millis(3_500)).await;
    let view = match_service::view(&state);
    assert_eq!(view.status, MatchStatus::Finished);
    assert_eq!(view.clock, "0:00");
    assert_eq!(view.teams.blue.score, 3);

    let export = serde_json::to_value(match_service::export(
        &state,
        std::time::SystemTime::now(),
    ))
    .unwrap();
    assert_eq!(export["winner"], "blue");
    assert_eq!(export["scannedQRCodes"][0], "GameQrcodeFach:laranja");

    match_service::reset_match(&state, ResetScope::Scores).unwrap();
    let view = match_service::view(&state);
    assert_eq!(view.status, MatchStatus::Waiting);
    assert_eq!(view.time_remaining, 3);
    assert_eq!(view.total_players, 2);
}

#[tokio::test]
async fn two_sessions_share_one_match_document() {
    let remote = MemoryMatchStore::default();
    let admin = synced_session(SessionRole::Admin, &remote).await;
    until(|| remote.document().is_some()).await;
    let player = synced_session(SessionRole::Player, &remote).await;

    match_service::add_player(&admin, "Ana", "blue").unwrap();
    until(|| player.store().snapshot().teams.blue.players == vec!["Ana"]).await;

    match_service::register_player(&player, "Bea", "Vermelha").unwrap();
    until(|| admin.store().snapshot().teams.total_players() == 2).await;
    assert_eq!(admin.store().snapshot().current_player, None);

    match_service::start_match(&admin).unwrap();
    until(|| player.store().snapshot().status == MatchStatus::Active).await;

    match_service::scan(&player, "GameQrcodeFach:vermelho", None).unwrap();
    until(|| admin.store().snapshot().teams.red.score == 5).await;
    assert!(admin.store().snapshot().has_scanned("GameQrcodeFach:vermelho"));

    // The ledger is shared, so the other session cannot credit the same marker.
    until(|| player.store().snapshot().scanned_codes.len() == 1).await;
    let err = match_service::scan(&admin, "GAME_QR_RED_042", Some("blue")).unwrap_err();
    assert!(err.to_string().contains("already scanned"));
}

#[tokio::test]
async fn losing_the_store_keeps_the_session_playable() {
    let remote = MemoryMatchStore::default();
    let state = synced_session(SessionRole::Admin, &remote).await;

    remote.set_offline(true);
    state.clear_document_store().await;
    assert!(state.is_degraded());

    match_service::add_player(&state, "Ana", "blue").unwrap();
    match_service::start_match(&state).unwrap();
    assert_eq!(state.store().snapshot().status, MatchStatus::Active);
    assert_eq!(state.sync_status(), SyncStatus::Offline);
}

#[tokio::test]
async fn points_scored_offline_survive_the_reconnect() {
    let remote = MemoryMatchStore::default();
    let state = synced_session(SessionRole::Admin, &remote).await;
    match_service::add_player(&state, "Ana", "blue").unwrap();
    match_service::start_match(&state).unwrap();
    until(|| remote.document().and_then(|doc| doc.status) == Some(MatchStatus::Active)).await;

    remote.set_offline(true);
    state.clear_document_store().await;
    match_service::scan(&state, "GameQrcodeFach:vermelho", Some("blue")).unwrap();
    assert_eq!(state.store().snapshot().teams.blue.score, 5);

    remote.set_offline(false);
    connect(&state, &remote).await;
    until(|| {
        remote
            .document()
            .and_then(|doc| doc.teams)
            .is_some_and(|teams| teams.blue.score == 5)
    })
    .await;

    let snapshot = state.store().snapshot();
    assert_eq!(snapshot.status, MatchStatus::Active);
    assert_eq!(snapshot.teams.blue.score, 5);
    assert_eq!(snapshot.teams.blue.players, vec!["Ana"]);
    assert_eq!(snapshot.scanned_codes, vec!["GameQrcodeFach:vermelho"]);
    assert_eq!(
        remote.document().and_then(|doc| doc.scanned_qr_codes),
        Some(vec!["GameQrcodeFach:vermelho".to_string()])
    );
}
