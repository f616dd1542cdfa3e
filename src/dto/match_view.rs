//! Derived read model pushed to browsers.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    qr::{self, QrStats},
    services::sync_bridge::SyncStatus,
    state::match_state::{MatchState, MatchStatus, PlayerRef, TeamId, Teams, format_clock},
};

/// Leading team, or a tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    /// Blue leads.
    Blue,
    /// Red leads.
    Red,
    /// Equal scores.
    Tie,
}

impl From<Option<TeamId>> for Winner {
    fn from(leader: Option<TeamId>) -> Self {
        match leader {
            Some(TeamId::Blue) => Winner::Blue,
            Some(TeamId::Red) => Winner::Red,
            None => Winner::Tie,
        }
    }
}

/// Everything a scoreboard or admin screen renders.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchView {
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Seconds left on the countdown.
    pub time_remaining: u32,
    /// `m:ss` rendering of `time_remaining`.
    pub clock: String,
    /// Both rosters with their scores.
    pub teams: Teams,
    /// Players across both teams.
    pub total_players: usize,
    /// Leading team, or a tie.
    pub winner: Winner,
    /// Player registered from this session.
    pub current_player: Option<PlayerRef>,
    /// Scan ledger in compact form.
    pub scanned_codes: Vec<String>,
    /// Statistics over the ledger.
    pub stats: QrStats,
    /// Whether this is an admin session.
    pub is_admin: bool,
    /// Where the remote mirror stands.
    pub sync: SyncStatus,
    /// No document store is reachable.
    pub degraded: bool,
}

impl MatchView {
    /// Derive the view of `state`.
    pub fn new(state: &MatchState, sync: SyncStatus, degraded: bool) -> Self {
        Self {
            status: state.status,
            time_remaining: state.time_remaining_secs,
            clock: format_clock(state.time_remaining_secs),
            teams: state.teams.clone(),
            total_players: state.teams.total_players(),
            winner: state.teams.leader().into(),
            current_player: state.current_player.clone(),
            scanned_codes: state.scanned_codes.clone(),
            stats: qr::compute_stats(&state.scanned_codes),
            is_admin: state.is_admin,
            sync,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_derives_clock_winner_and_stats() {
        let mut state = MatchState::with_duration(125);
        state.teams.red.players.push("Bea".into());
        state.teams.red.score = 8;
        state.scanned_codes = vec![
            "GameQrcodeFach:vermelho".into(),
            "GameQrcodeFach:laranja".into(),
        ];

        let view = MatchView::new(&state, SyncStatus::Synced, false);
        assert_eq!(view.clock, "2:05");
        assert_eq!(view.winner, Winner::Red);
        assert_eq!(view.total_players, 1);
        assert_eq!(view.stats.total, 2);
        assert_eq!(view.stats.total_points, 8);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["winner"], "red");
        assert_eq!(json["sync"], "synced");
    }
}
