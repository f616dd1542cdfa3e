use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::{dao::models::MatchDocument, state::match_state::Team};

/// Stored shape of the match document: the remote fields under a string `_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub body: MatchDocument,
}

fn team_document(team: &Team) -> Document {
    doc! {
        "players": team.players.clone(),
        "score": team.score,
    }
}

/// `$set` body for a merge patch; only present fields are listed.
pub fn set_document(patch: &MatchDocument) -> Document {
    let mut set = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", status.as_str());
    }
    if let Some(time_remaining) = patch.time_remaining {
        set.insert("timeRemaining", time_remaining);
    }
    if let Some(teams) = &patch.teams {
        set.insert(
            "teams",
            doc! {
                "blue": team_document(&teams.blue),
                "red": team_document(&teams.red),
            },
        );
    }
    if let Some(codes) = &patch.scanned_qr_codes {
        set.insert("scannedQRCodes", codes.clone());
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::{MatchStatus, Teams};

    #[test]
    fn set_document_lists_present_fields_only() {
        let set = set_document(&MatchDocument {
            status: Some(MatchStatus::Active),
            time_remaining: Some(120),
            ..MatchDocument::default()
        });

        assert_eq!(set, doc! { "status": "active", "timeRemaining": 120_i64 });
    }

    #[test]
    fn teams_use_remote_field_names() {
        let mut teams = Teams::default();
        teams.red.players.push("Bea".into());
        teams.red.score = 5;

        let set = set_document(&MatchDocument {
            teams: Some(teams),
            ..MatchDocument::default()
        });

        assert_eq!(
            set,
            doc! {
                "teams": {
                    "blue": { "players": [], "score": 0 },
                    "red": { "players": ["Bea"], "score": 5 },
                }
            }
        );
    }
}
