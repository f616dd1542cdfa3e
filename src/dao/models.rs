//! Shape of the shared match document.

use serde::{Deserialize, Serialize};

use crate::state::{
    match_state::{MatchState, MatchStatus, Teams},
    store::{Action, SyncedFields},
};

/// Persisted fields of the remote match document.
///
/// The same shape doubles as a merge patch: absent fields are left untouched
/// when merged into an existing document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDocument {
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    /// Seconds left; other clients may store negative values.
    #[serde(
        rename = "timeRemaining",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub time_remaining: Option<i64>,
    /// Both rosters with their scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<Teams>,
    /// Scan ledger.
    #[serde(
        rename = "scannedQRCodes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scanned_qr_codes: Option<Vec<String>>,
}

impl MatchDocument {
    /// Project the selected persisted fields of `state`.
    pub fn project(state: &MatchState, fields: SyncedFields) -> Self {
        Self {
            status: fields.status.then_some(state.status),
            time_remaining: fields
                .time_remaining
                .then_some(i64::from(state.time_remaining_secs)),
            teams: fields.teams.then(|| state.teams.clone()),
            scanned_qr_codes: fields.scanned_codes.then(|| state.scanned_codes.clone()),
        }
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.time_remaining.is_none()
            && self.teams.is_none()
            && self.scanned_qr_codes.is_none()
    }

    /// Drop `fields` from this document.
    pub fn without(mut self, fields: SyncedFields) -> Self {
        if fields.status {
            self.status = None;
        }
        if fields.time_remaining {
            self.time_remaining = None;
        }
        if fields.teams {
            self.teams = None;
        }
        if fields.scanned_codes {
            self.scanned_qr_codes = None;
        }
        self
    }

    /// Field-level merge: every field present in `patch` overwrites ours.
    pub fn merge(&mut self, patch: MatchDocument) {
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(time_remaining) = patch.time_remaining {
            self.time_remaining = Some(time_remaining);
        }
        if let Some(teams) = patch.teams {
            self.teams = Some(teams);
        }
        if let Some(codes) = patch.scanned_qr_codes {
            self.scanned_qr_codes = Some(codes);
        }
    }

    /// Actions restating this document onto a local store.
    ///
    /// Status, time and teams are overwritten wholesale. The ledger is cleared
    /// and refilled without crediting points. Missing fields are skipped.
    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(5);
        if let Some(status) = self.status {
            actions.push(Action::SetStatus(status));
        }
        if let Some(time_remaining) = self.time_remaining {
            let seconds = u32::try_from(time_remaining.max(0)).unwrap_or(u32::MAX);
            actions.push(Action::SetTimeRemaining(seconds));
        }
        if let Some(teams) = self.teams {
            actions.push(Action::SetTeams(teams));
        }
        if let Some(codes) = self.scanned_qr_codes {
            actions.push(Action::ResetScannedCodes);
            actions.push(Action::RecordScannedCodes(codes));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::match_state::TeamId;

    #[test]
    fn parses_remote_shape() {
        let doc: MatchDocument = serde_json::from_value(json!({
            "_id": "current",
            "_rev": "3-abc",
            "status": "active",
            "timeRemaining": 412,
            "teams": {
                "blue": { "players": ["Ana"], "score": 3 },
                "red": { "players": ["Bea", "Caio"], "score": 1 }
            },
            "scannedQRCodes": ["GameQrcodeFach:laranja"],
            "results": []
        }))
        .unwrap();

        assert_eq!(doc.status, Some(MatchStatus::Active));
        assert_eq!(doc.time_remaining, Some(412));
        assert_eq!(doc.teams.as_ref().unwrap().get(TeamId::Red).players.len(), 2);
        assert_eq!(
            doc.scanned_qr_codes,
            Some(vec!["GameQrcodeFach:laranja".to_string()])
        );
    }

    #[test]
    fn patch_serializes_only_selected_fields() {
        let state = MatchState::default();
        let patch = MatchDocument::project(
            &state,
            SyncedFields {
                time_remaining: true,
                ..SyncedFields::default()
            },
        );
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "timeRemaining": 600 })
        );
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut doc = MatchDocument::project(&MatchState::default(), SyncedFields::ALL);
        doc.merge(MatchDocument {
            status: Some(MatchStatus::Finished),
            ..MatchDocument::default()
        });
        assert_eq!(doc.status, Some(MatchStatus::Finished));
        assert_eq!(doc.time_remaining, Some(600));
        assert_eq!(doc.scanned_qr_codes, Some(Vec::new()));
    }

    #[test]
    fn negative_remote_time_is_clamped() {
        let actions = MatchDocument {
            time_remaining: Some(-4),
            ..MatchDocument::default()
        }
        .into_actions();
        assert_eq!(actions, vec![Action::SetTimeRemaining(0)]);
    }

    #[test]
    fn ledger_is_restated_not_rescored() {
        let actions = MatchDocument {
            scanned_qr_codes: Some(vec!["GameQrcodeFach:verde".into()]),
            ..MatchDocument::default()
        }
        .into_actions();
        assert_eq!(
            actions,
            vec![
                Action::ResetScannedCodes,
                Action::RecordScannedCodes(vec!["GameQrcodeFach:verde".into()]),
            ]
        );
    }
}
