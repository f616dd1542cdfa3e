//! Session state owned by one client process.

pub mod lifecycle;
/// Match data model.
pub mod match_state;
mod sse;
/// Actions, the reducer and the store.
pub mod store;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::{AppConfig, SessionRole, StoreBackend},
    dao::match_store::MatchDocumentStore,
    services::sync_bridge::{SyncBridge, SyncStatus},
    state::{
        match_state::MatchState,
        store::{MatchStore, SharedStore},
    },
};

pub use self::sse::SseHub;

/// Handle shared by routes and background tasks.
pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 32;

/// Single owner of everything one client session holds: the match store, the
/// remote document handle with its sync session, and the SSE hub.
pub struct AppState {
    /// Identifies this session in logs across reconnects.
    id: Uuid,
    config: AppConfig,
    store: SharedStore,
    document_store: RwLock<Option<Arc<dyn MatchDocumentStore>>>,
    bridge: Mutex<Option<SyncBridge>>,
    degraded: watch::Sender<bool>,
    sync_status: Arc<watch::Sender<SyncStatus>>,
    sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// When a remote store is configured the session starts degraded until the
    /// supervisor installs a connected backend.
    pub fn new(config: AppConfig) -> SharedState {
        let mut initial = MatchState::with_duration(config.match_duration_secs);
        initial.is_admin = config.role == SessionRole::Admin;

        let (degraded_tx, _rx) = watch::channel(config.store != StoreBackend::None);
        let (sync_tx, _rx) = watch::channel(SyncStatus::Offline);

        Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            store: MatchStore::shared(initial),
            document_store: RwLock::new(None),
            bridge: Mutex::new(None),
            degraded: degraded_tx,
            sync_status: Arc::new(sync_tx),
            sse: SseHub::new(SSE_CAPACITY),
        })
    }

    /// Session identifier, fresh on every start.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration the session was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session's match store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Broadcast hub used for the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Obtain a handle to the current document store, if one is installed.
    pub async fn document_store(&self) -> Option<Arc<dyn MatchDocumentStore>> {
        let guard = self.document_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a connected document store, start a sync session on it and
    /// leave degraded mode.
    pub async fn install_document_store(&self, remote: Arc<dyn MatchDocumentStore>) {
        {
            let mut guard = self.document_store.write().await;
            *guard = Some(remote);
        }
        self.restart_sync().await;
        self.update_degraded(false);
    }

    /// Replace the running sync session with a fresh one on the installed store.
    pub async fn restart_sync(&self) {
        let Some(remote) = self.document_store().await else {
            return;
        };
        let session = SyncBridge::spawn(self.store.clone(), remote, self.sync_status.clone());
        // Dropping the previous session cancels its subscription.
        let mut guard = self.bridge.lock().await;
        *guard = Some(session);
        info!(session = %self.id, "sync session started");
    }

    /// Drop the document store and its sync session, and enter degraded mode.
    ///
    /// The local store keeps working on its own.
    pub async fn clear_document_store(&self) {
        self.stop_sync().await;
        {
            let mut guard = self.document_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Whether a sync session is installed and still running.
    pub async fn sync_running(&self) -> bool {
        let guard = self.bridge.lock().await;
        guard.as_ref().is_some_and(|session| !session.is_finished())
    }

    /// Cancel the sync session, if any.
    pub async fn stop_sync(&self) {
        let session = self.bridge.lock().await.take();
        if session.is_some() {
            info!(session = %self.id, "sync session stopped");
        }
        drop(session);
        self.sync_status.send_replace(SyncStatus::Offline);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// State of the remote mirror.
    pub fn sync_status(&self) -> SyncStatus {
        *self.sync_status.borrow()
    }

    /// Subscribe to sync status updates.
    pub fn sync_watcher(&self) -> watch::Receiver<SyncStatus> {
        self.sync_status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::match_store::memory::MemoryMatchStore;

    fn config(store: StoreBackend) -> AppConfig {
        AppConfig {
            store,
            ..AppConfig::default()
        }
    }

    #[test]
    fn session_starts_with_configured_duration_and_role() {
        let state = AppState::new(AppConfig {
            match_duration_secs: 90,
            role: SessionRole::Player,
            ..AppConfig::default()
        });
        let snapshot = state.store().snapshot();
        assert_eq!(snapshot.time_remaining_secs, 90);
        assert!(!snapshot.is_admin);
        assert!(!state.is_degraded());
    }

    #[tokio::test]
    async fn installing_and_clearing_a_store_toggles_degraded_mode() {
        let state = AppState::new(config(StoreBackend::Couch));
        assert!(state.is_degraded());
        let mut degraded = state.degraded_watcher();

        let remote = MemoryMatchStore::default();
        state.install_document_store(Arc::new(remote.clone())).await;
        assert!(!state.is_degraded());
        assert!(degraded.has_changed().unwrap());

        let mut sync = state.sync_watcher();
        tokio::time::timeout(
            Duration::from_secs(1),
            sync.wait_for(|status| *status == SyncStatus::Synced),
        )
        .await
        .unwrap()
        .unwrap();

        state.clear_document_store().await;
        assert!(state.is_degraded());
        assert!(state.document_store().await.is_none());
        assert_eq!(state.sync_status(), SyncStatus::Offline);
    }
}
