//! JSON export of a match.

use std::time::SystemTime;

use serde::Serialize;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use utoipa::ToSchema;

use crate::{
    dto::{format_system_time, match_view::Winner},
    state::match_state::{MatchState, MatchStatus, Teams},
};

const FILE_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Downloadable snapshot of a match, in the remote document's field naming.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchExport {
    /// RFC 3339 time the export was taken.
    pub timestamp: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Seconds left on the countdown.
    pub time_remaining: u32,
    /// Both rosters with their scores.
    pub teams: Teams,
    /// Players across both teams.
    pub total_players: usize,
    /// `blue`, `red` or `tie`.
    pub winner: Winner,
    /// Scan ledger.
    #[serde(rename = "scannedQRCodes")]
    pub scanned_qr_codes: Vec<String>,
}

impl MatchExport {
    /// Export `state` as taken at `at`.
    pub fn new(state: &MatchState, at: SystemTime) -> Self {
        Self {
            timestamp: format_system_time(at),
            status: state.status,
            time_remaining: state.time_remaining_secs,
            teams: state.teams.clone(),
            total_players: state.teams.total_players(),
            winner: state.teams.leader().into(),
            scanned_qr_codes: state.scanned_codes.clone(),
        }
    }
}

/// `qr-hunt-<YYYY-MM-DD>.json` for the UTC day of `at`.
pub fn export_file_name(at: SystemTime) -> String {
    let date = OffsetDateTime::from(at)
        .format(FILE_DATE)
        .unwrap_or_else(|_| "undated".into());
    format!("qr-hunt-{date}.json")
}
