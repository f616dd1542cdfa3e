use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Maximum number of players on one team.
pub const MAX_ROSTER: usize = 5;
/// Default match duration in seconds (10 minutes).
pub const DEFAULT_MATCH_DURATION_SECS: u32 = 600;

/// Lifecycle of the single live match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Players are registering; no scans are expected yet.
    #[default]
    Waiting,
    /// The countdown is running.
    Active,
    /// Time ran out or the admin stopped the match.
    Finished,
}

impl MatchStatus {
    /// Wire name used in the remote document.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Active => "active",
            MatchStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two fixed squads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TeamId {
    /// Blue squad ("Azul" on the mobile app).
    #[serde(alias = "Azul", alias = "azul")]
    Blue,
    /// Red squad ("Vermelha" on the mobile app).
    #[serde(alias = "Vermelha", alias = "vermelha")]
    Red,
}

impl TeamId {
    /// Both teams in display order.
    pub const ALL: [TeamId; 2] = [TeamId::Blue, TeamId::Red];

    /// Wire name used in the remote document.
    pub fn as_str(self) -> &'static str {
        match self {
            TeamId::Blue => "blue",
            TeamId::Red => "red",
        }
    }

    /// Name shown by the mobile app.
    pub fn display_name(self) -> &'static str {
        match self {
            TeamId::Blue => "Azul",
            TeamId::Red => "Vermelha",
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a team name matches neither the web nor the mobile spelling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown team `{0}`")]
pub struct UnknownTeam(pub String);

impl FromStr for TeamId {
    type Err = UnknownTeam;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blue" | "azul" => Ok(TeamId::Blue),
            "red" | "vermelha" => Ok(TeamId::Red),
            _ => Err(UnknownTeam(value.to_string())),
        }
    }
}

/// Roster and score of one team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Team {
    /// Player names in join order.
    #[serde(default)]
    pub players: Vec<String>,
    /// Current score, never negative.
    #[serde(default)]
    pub score: i32,
}

impl Team {
    /// Whether the roster reached [`MAX_ROSTER`].
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_ROSTER
    }
}

/// Both teams, keyed by [`TeamId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Teams {
    /// Team `Azul`.
    #[serde(default)]
    pub blue: Team,
    /// Team `Vermelha`.
    #[serde(default)]
    pub red: Team,
}

impl Teams {
    /// Borrow one team.
    pub fn get(&self, id: TeamId) -> &Team {
        match id {
            TeamId::Blue => &self.blue,
            TeamId::Red => &self.red,
        }
    }

    /// Borrow one team mutably.
    pub fn get_mut(&mut self, id: TeamId) -> &mut Team {
        match id {
            TeamId::Blue => &mut self.blue,
            TeamId::Red => &mut self.red,
        }
    }

    /// Players registered across both teams.
    pub fn total_players(&self) -> usize {
        self.blue.players.len() + self.red.players.len()
    }

    /// Leading team, or `None` on a tie.
    pub fn leader(&self) -> Option<TeamId> {
        match self.blue.score.cmp(&self.red.score) {
            std::cmp::Ordering::Greater => Some(TeamId::Blue),
            std::cmp::Ordering::Less => Some(TeamId::Red),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Copy with both scores zeroed and rosters kept.
    pub fn with_scores_cleared(&self) -> Self {
        let mut teams = self.clone();
        teams.blue.score = 0;
        teams.red.score = 0;
        teams
    }
}

/// The player registered by this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerRef {
    /// Display name.
    pub name: String,
    /// Team joined.
    pub team: TeamId,
}

/// Full state of the live match as seen by this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Seconds left on the countdown.
    pub time_remaining_secs: u32,
    /// Both rosters with their scores.
    pub teams: Teams,
    /// Local only: the player registered from this session, if any.
    pub current_player: Option<PlayerRef>,
    /// Normalised payloads already credited, in scan order, without duplicates.
    pub scanned_codes: Vec<String>,
    /// Local only: whether this session drives the match as admin.
    pub is_admin: bool,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::with_duration(DEFAULT_MATCH_DURATION_SECS)
    }
}

impl MatchState {
    /// Fresh waiting match whose countdown starts at `duration_secs`.
    pub fn with_duration(duration_secs: u32) -> Self {
        Self {
            status: MatchStatus::Waiting,
            time_remaining_secs: duration_secs,
            teams: Teams::default(),
            current_player: None,
            scanned_codes: Vec::new(),
            is_admin: false,
        }
    }

    /// Whether `code` is already in the scan ledger.
    pub fn has_scanned(&self, code: &str) -> bool {
        self.scanned_codes.iter().any(|existing| existing == code)
    }
}

/// Render seconds as `m:ss`.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_ids_accept_mobile_names() {
        assert_eq!("blue".parse::<TeamId>().unwrap(), TeamId::Blue);
        assert_eq!("Azul".parse::<TeamId>().unwrap(), TeamId::Blue);
        assert_eq!(" RED ".parse::<TeamId>().unwrap(), TeamId::Red);
        assert_eq!("Vermelha".parse::<TeamId>().unwrap(), TeamId::Red);
        assert!("green".parse::<TeamId>().is_err());
    }

    #[test]
    fn teams_serialize_to_remote_shape() {
        let mut teams = Teams::default();
        teams.blue.players.push("Ana".into());
        teams.red.score = 4;

        let value = serde_json::to_value(&teams).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "blue": { "players": ["Ana"], "score": 0 },
                "red": { "players": [], "score": 4 }
            })
        );
    }

    #[test]
    fn leader_reports_ties() {
        let mut teams = Teams::default();
        assert_eq!(teams.leader(), None);
        teams.red.score = 3;
        assert_eq!(teams.leader(), Some(TeamId::Red));
        teams.blue.score = 5;
        assert_eq!(teams.leader(), Some(TeamId::Blue));
    }

    #[test]
    fn clock_pads_seconds() {
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(0), "0:00");
    }
}
