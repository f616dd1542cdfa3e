use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::{
    qr,
    state::match_state::{MAX_ROSTER, MatchState, MatchStatus, PlayerRef, TeamId, Teams},
};

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Every mutation the store accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Overwrite the match status.
    SetStatus(MatchStatus),
    /// Overwrite the countdown value.
    SetTimeRemaining(u32),
    /// Replace both teams at once (remote snapshots, admin edits).
    SetTeams(Teams),
    /// Append a player to a roster. Fails with [`ActionError::RosterFull`].
    AddPlayer {
        /// Player name, already trimmed by the caller.
        name: String,
        /// Target team.
        team: TeamId,
    },
    /// Credit (or debit) points, optionally consuming a QR payload.
    /// Fails with [`ActionError::DuplicateScan`] when the payload was already credited.
    AddScore {
        /// Team receiving the points.
        team: TeamId,
        /// Whole-point delta, negative for manual corrections.
        points: i32,
        /// Scanned payload to record in the ledger.
        qr_code: Option<String>,
    },
    /// Empty the scan ledger.
    ResetScannedCodes,
    /// Restate ledger entries without crediting any points.
    RecordScannedCodes(Vec<String>),
    /// Set or clear the player registered from this session.
    SetCurrentPlayer(Option<PlayerRef>),
    /// Toggle the local admin flag.
    SetIsAdmin(bool),
}

/// Recoverable failures raised by [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The target roster already holds [`MAX_ROSTER`] players.
    #[error("team `{team}` is full (max {max} players)")]
    RosterFull {
        /// Team that rejected the player.
        team: TeamId,
        /// Roster limit.
        max: usize,
    },
    /// The payload is already in the scan ledger.
    #[error("QR code `{code}` was already scanned")]
    DuplicateScan {
        /// Normalised payload.
        code: String,
    },
}

/// Who produced a change: this session or an inbound remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Dispatched by this session (UI, timer).
    Local,
    /// Restated from the remote document.
    Remote,
}

/// Which of the remotely persisted fields differ between two states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncedFields {
    /// `status`
    pub status: bool,
    /// `timeRemaining`
    pub time_remaining: bool,
    /// `teams`
    pub teams: bool,
    /// `scannedQRCodes`
    pub scanned_codes: bool,
}

impl SyncedFields {
    /// All persisted fields.
    pub const ALL: SyncedFields = SyncedFields {
        status: true,
        time_remaining: true,
        teams: true,
        scanned_codes: true,
    };

    /// Compare the persisted fields of two states.
    pub fn between(before: &MatchState, after: &MatchState) -> Self {
        Self {
            status: before.status != after.status,
            time_remaining: before.time_remaining_secs != after.time_remaining_secs,
            teams: before.teams != after.teams,
            scanned_codes: before.scanned_codes != after.scanned_codes,
        }
    }

    /// Whether at least one persisted field changed.
    pub fn any(&self) -> bool {
        self.status || self.time_remaining || self.teams || self.scanned_codes
    }

    /// Field-wise union.
    pub fn union(self, other: Self) -> Self {
        Self {
            status: self.status || other.status,
            time_remaining: self.time_remaining || other.time_remaining,
            teams: self.teams || other.teams,
            scanned_codes: self.scanned_codes || other.scanned_codes,
        }
    }

    /// Fields set here but not in `other`.
    pub fn without(self, other: Self) -> Self {
        Self {
            status: self.status && !other.status,
            time_remaining: self.time_remaining && !other.time_remaining,
            teams: self.teams && !other.teams,
            scanned_codes: self.scanned_codes && !other.scanned_codes,
        }
    }
}

/// Notification emitted after every effective mutation.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Producer of the change.
    pub origin: Origin,
    /// Persisted fields the change touched.
    pub fields: SyncedFields,
    /// State right after the mutation.
    pub state: MatchState,
}

/// Ledger key for a payload: the compact form when the codec understands it.
fn ledger_key(code: String) -> String {
    qr::normalize(&code).normalized.unwrap_or(code)
}

/// Pure reduction of one action over the current state.
pub fn reduce(mut state: MatchState, action: Action) -> Result<MatchState, ActionError> {
    match action {
        Action::SetStatus(status) => state.status = status,
        Action::SetTimeRemaining(seconds) => state.time_remaining_secs = seconds,
        Action::SetTeams(teams) => state.teams = teams,
        Action::AddPlayer { name, team } => {
            let roster = state.teams.get_mut(team);
            if roster.is_full() {
                return Err(ActionError::RosterFull {
                    team,
                    max: MAX_ROSTER,
                });
            }
            roster.players.push(name);
        }
        Action::AddScore {
            team,
            points,
            qr_code,
        } => {
            let key = qr_code.map(ledger_key);
            if let Some(code) = &key {
                if state.has_scanned(code) {
                    return Err(ActionError::DuplicateScan { code: code.clone() });
                }
            }
            let entry = state.teams.get_mut(team);
            entry.score = entry.score.saturating_add(points).max(0);
            state.scanned_codes.extend(key);
        }
        Action::ResetScannedCodes => state.scanned_codes.clear(),
        Action::RecordScannedCodes(codes) => {
            for code in codes.into_iter().map(ledger_key) {
                if !state.has_scanned(&code) {
                    state.scanned_codes.push(code);
                }
            }
        }
        Action::SetCurrentPlayer(player) => state.current_player = player,
        Action::SetIsAdmin(is_admin) => state.is_admin = is_admin,
    }

    Ok(state)
}

/// Shared handle to the session's store.
pub type SharedStore = Arc<MatchStore>;

/// Owner of the session's [`MatchState`]; every mutation goes through [`Action`]s.
pub struct MatchStore {
    state: watch::Sender<MatchState>,
    changes: broadcast::Sender<StateChange>,
    /// Persisted fields changed locally and not yet confirmed by the remote.
    /// `None` until the first sync: before that there is nothing shared to diverge from.
    unsynced: watch::Sender<Option<SyncedFields>>,
}

impl MatchStore {
    /// Build a store seeded with `initial`.
    pub fn new(initial: MatchState) -> Self {
        let (state, _rx) = watch::channel(initial);
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (unsynced, _rx) = watch::channel(None);
        Self {
            state,
            changes,
            unsynced,
        }
    }

    /// Build a store already wrapped in an [`Arc`].
    pub fn shared(initial: MatchState) -> SharedStore {
        Arc::new(Self::new(initial))
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> MatchState {
        self.state.borrow().clone()
    }

    /// Run `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&MatchState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Receiver that always holds the latest state.
    pub fn watch(&self) -> watch::Receiver<MatchState> {
        self.state.subscribe()
    }

    /// Subscribe to change notifications emitted after each effective mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Persisted fields changed locally since the remote last took them, or
    /// `None` when this store was never synced.
    pub fn unsynced(&self) -> Option<SyncedFields> {
        *self.unsynced.borrow()
    }

    /// Record that the remote now holds `fields` as they stand locally.
    pub fn mark_synced(&self, fields: SyncedFields) {
        self.unsynced
            .send_modify(|pending| *pending = Some(pending.unwrap_or_default().without(fields)));
    }

    /// Apply a single local action.
    pub fn dispatch(&self, action: Action) -> Result<(), ActionError> {
        self.dispatch_batch(Origin::Local, [action])
    }

    /// Apply several actions atomically: either all of them land or none does.
    ///
    /// Observers see one notification for the whole batch.
    pub fn dispatch_batch<I>(&self, origin: Origin, actions: I) -> Result<(), ActionError>
    where
        I: IntoIterator<Item = Action>,
    {
        self.dispatch_from(origin, |_| Ok::<_, ActionError>(actions))
    }

    /// Plan a batch from the current state and apply it under the same lock.
    ///
    /// No other mutation can slip between reading the state and applying the plan.
    pub fn dispatch_from<F, I, E>(&self, origin: Origin, plan: F) -> Result<(), E>
    where
        F: FnOnce(&MatchState) -> Result<I, E>,
        I: IntoIterator<Item = Action>,
        E: From<ActionError>,
    {
        let mut outcome = Ok(());
        let changes = &self.changes;
        let unsynced = &self.unsynced;

        self.state.send_if_modified(|current| {
            let actions = match plan(current) {
                Ok(actions) => actions,
                Err(err) => {
                    outcome = Err(err);
                    return false;
                }
            };

            let mut next = current.clone();
            for action in actions {
                match reduce(next, action) {
                    Ok(state) => next = state,
                    Err(err) => {
                        debug!(error = %err, "action rejected");
                        outcome = Err(err.into());
                        return false;
                    }
                }
            }

            if next == *current {
                return false;
            }

            let fields = SyncedFields::between(current, &next);
            if origin == Origin::Local && fields.any() {
                unsynced.send_if_modified(|pending| match pending {
                    Some(pending) => {
                        *pending = pending.union(fields);
                        true
                    }
                    None => false,
                });
            }
            *current = next;
            // Sent while the state lock is held so notifications keep mutation order.
            let _ = changes.send(StateChange {
                origin,
                fields,
                state: current.clone(),
            });
            true
        });

        outcome
    }
}
