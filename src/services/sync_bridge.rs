//! Mirror of the local match store onto the shared remote document.
//!
//! Inbound snapshots are restated onto the store as [`Origin::Remote`] batches.
//! Local changes are merge-written field by field, but only once the first
//! snapshot arrived, so stale defaults never overwrite the shared match.
//! Fields changed locally while a previous session was down are the exception:
//! they win over the first snapshot and are written back.

use std::{collections::VecDeque, sync::Arc};

use futures::StreamExt;
use serde::Serialize;
use tokio::{
    sync::{
        broadcast::{
            self,
            error::{RecvError, TryRecvError},
        },
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    dao::{
        match_store::{MatchDocumentStore, Snapshot},
        models::MatchDocument,
    },
    state::store::{Origin, SharedStore, StateChange, SyncedFields},
};

/// How many of our own writes are remembered to recognise their echoes.
const ECHO_WINDOW: usize = 16;

/// Where the session stands with the remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No remote store, or the subscription ended.
    Offline,
    /// Subscribed, waiting for the first snapshot.
    Connecting,
    /// First snapshot received; local changes are written through.
    Synced,
}

/// Handle on a running sync session. Dropping it cancels the session.
pub struct SyncBridge {
    handle: JoinHandle<()>,
}

impl SyncBridge {
    /// Start a sync session between `store` and `remote`.
    pub fn spawn(
        store: SharedStore,
        remote: Arc<dyn MatchDocumentStore>,
        status: Arc<watch::Sender<SyncStatus>>,
    ) -> Self {
        let handle = tokio::spawn(run(store, remote, status));
        Self { handle }
    }

    /// Whether the session task already ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Documents this session wrote recently, as the remote should report them back.
#[derive(Default)]
struct EchoFilter {
    recent: VecDeque<MatchDocument>,
}

impl EchoFilter {
    fn record(&mut self, expected: MatchDocument) {
        if self.recent.len() == ECHO_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(expected);
    }

    /// Consume `snapshot` if it is the echo of one of our writes. Older
    /// entries are dropped with it since the remote moved past them.
    fn take_echo(&mut self, snapshot: &MatchDocument) -> bool {
        match self.recent.iter().position(|expected| expected == snapshot) {
            Some(index) => {
                self.recent.drain(..=index);
                true
            }
            None => false,
        }
    }
}

struct Session {
    store: SharedStore,
    remote: Arc<dyn MatchDocumentStore>,
    status: Arc<watch::Sender<SyncStatus>>,
    loaded: bool,
    /// Best known content of the remote document.
    mirror: MatchDocument,
    echoes: EchoFilter,
}

async fn run(
    store: SharedStore,
    remote: Arc<dyn MatchDocumentStore>,
    status: Arc<watch::Sender<SyncStatus>>,
) {
    // Subscribe locally first so no change falls between load and write-through.
    let mut changes = store.subscribe();
    status.send_replace(SyncStatus::Connecting);

    let mut snapshots = match remote.subscribe().await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "failed to subscribe to the match document; staying local");
            status.send_replace(SyncStatus::Offline);
            return;
        }
    };

    let mut session = Session {
        store,
        remote,
        status,
        loaded: false,
        mirror: MatchDocument::default(),
        echoes: EchoFilter::default(),
    };

    loop {
        tokio::select! {
            snapshot = snapshots.next() => match snapshot {
                Some(Ok(snapshot)) => session.on_snapshot(snapshot, &mut changes).await,
                Some(Err(err)) => warn!(error = %err, "match document subscription error"),
                None => {
                    warn!("match document subscription ended");
                    break;
                }
            },
            change = changes.recv() => match change {
                Ok(change) => session.on_change(change).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync bridge lagged behind local changes; writing full state");
                    session.write_through(SyncedFields::ALL).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.status.send_replace(SyncStatus::Offline);
}

impl Session {
    async fn on_snapshot(
        &mut self,
        snapshot: Snapshot,
        changes: &mut broadcast::Receiver<StateChange>,
    ) {
        // Local fields the first snapshot must not overwrite.
        let mut keep = SyncedFields::default();
        if !self.loaded {
            // Queued notifications predate the load; the state read below covers them.
            discard_queued(changes);
            keep = self.store.unsynced().unwrap_or_default();
        }

        match snapshot {
            Some(document) => {
                if self.echoes.take_echo(&document) {
                    debug!("ignoring echo of our own write");
                } else {
                    self.mirror = document.clone();
                    if let Err(err) = self
                        .store
                        .dispatch_batch(Origin::Remote, document.without(keep).into_actions())
                    {
                        warn!(error = %err, "remote snapshot rejected by the store");
                    }
                }
                self.mark_loaded();
                if keep.any() {
                    info!(?keep, "writing back local changes made while offline");
                    self.write_through(keep).await;
                }
            }
            None => {
                info!("match document missing; seeding it from local state");
                self.mirror = MatchDocument::default();
                self.mark_loaded();
                self.write_through(SyncedFields::ALL).await;
            }
        }
    }

    async fn on_change(&mut self, change: StateChange) {
        if !self.loaded || change.origin != Origin::Local || !change.fields.any() {
            return;
        }
        let patch = MatchDocument::project(&change.state, change.fields);
        if self.write(patch).await {
            self.store.mark_synced(change.fields);
        }
    }

    /// Write the given fields of the store's current state.
    async fn write_through(&mut self, fields: SyncedFields) {
        if !self.loaded {
            return;
        }
        let patch = self
            .store
            .read(|state| MatchDocument::project(state, fields));
        if self.write(patch).await {
            self.store.mark_synced(fields);
        }
    }

    /// Merge-write `patch`; `true` once the remote accepted it.
    async fn write(&mut self, patch: MatchDocument) -> bool {
        if patch.is_empty() {
            return true;
        }
        let mut expected = self.mirror.clone();
        expected.merge(patch.clone());

        match self.remote.write(patch).await {
            Ok(()) => {
                self.mirror = expected.clone();
                self.echoes.record(expected);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to write match document");
                false
            }
        }
    }

    fn mark_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        // From here on, local changes count as diverging from the remote.
        self.store.mark_synced(SyncedFields::default());
        self.status.send_replace(SyncStatus::Synced);
        info!("match document loaded; sync active");
    }
}

fn discard_queued(changes: &mut broadcast::Receiver<StateChange>) {
    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
