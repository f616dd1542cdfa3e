use serde::Deserialize;
use serde_json::Value;

pub const CHANGES_PATH: &str = "_changes";
/// How long CouchDB may hold a longpoll request open, in milliseconds.
pub const LONGPOLL_TIMEOUT_MS: u64 = 30_000;

/// Body of a `_changes` response restricted to a set of document ids.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    /// Opaque sequence token; a string on CouchDB 2+, a number on 1.x.
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

impl ChangesResponse {
    /// `since` query value resuming right after this response.
    pub fn since_token(&self) -> String {
        match &self.last_seq {
            Value::String(seq) => seq.clone(),
            other => other.to_string(),
        }
    }

    /// Most recent row for `doc_id`, if the feed reported one.
    pub fn latest_for(self, doc_id: &str) -> Option<ChangeRow> {
        self.results.into_iter().rev().find(|row| row.id == doc_id)
    }
}
