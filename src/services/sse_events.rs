use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    dto::sse::{ServerEvent, SystemStatus},
    services::match_service,
    state::SharedState,
};

/// Carries a [`crate::dto::match_view::MatchView`].
pub const EVENT_MATCH_STATE: &str = "match.state";
/// Carries a [`SystemStatus`].
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Current [`crate::dto::match_view::MatchView`] as a `match.state` event.
pub fn match_state_event(state: &SharedState) -> Option<ServerEvent> {
    encode(EVENT_MATCH_STATE, &match_service::view(state))
}

/// Broadcast the current match view to every SSE subscriber.
pub fn broadcast_match_state(state: &SharedState) {
    if let Some(event) = match_state_event(state) {
        state.sse().broadcast(event);
    }
}

/// Broadcast a degraded mode flip.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    if let Some(event) = encode(EVENT_SYSTEM_STATUS, &SystemStatus { degraded }) {
        state.sse().broadcast(event);
    }
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

/// Push store changes, sync status changes and degraded flips onto the SSE hub.
///
/// Watch receivers coalesce bursts, so a slow hub only ever sees the latest view.
pub fn spawn_forwarder(state: SharedState) -> JoinHandle<()> {
    let mut match_rx = state.store().watch();
    let mut sync_rx = state.sync_watcher();
    let mut degraded_rx = state.degraded_watcher();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = match_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    broadcast_match_state(&state);
                }
                changed = sync_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *sync_rx.borrow();
                    debug!(?status, "sync status changed");
                    broadcast_match_state(&state);
                }
                changed = degraded_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let degraded = *degraded_rx.borrow();
                    broadcast_system_status(&state, degraded);
                    broadcast_match_state(&state);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn store_changes_become_match_state_events() {
        let state = AppState::new(AppConfig::default());
        let mut events = state.sse().subscribe();
        let forwarder = spawn_forwarder(state.clone());

        match_service::add_player(&state, "Ana", "blue").unwrap();

        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_MATCH_STATE));
        let view: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(view["total_players"], 1);

        forwarder.abort();
    }

    #[tokio::test]
    async fn degraded_flips_emit_system_status() {
        let state = AppState::new(AppConfig::default());
        let mut events = state.sse().subscribe();
        let forwarder = spawn_forwarder(state.clone());

        state.update_degraded(true);

        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SYSTEM_STATUS));
        assert_eq!(event.data, r#"{"degraded":true}"#);

        forwarder.abort();
    }
}
