//! In-process stand-in for the shared remote document, used by the sync and
//! session tests. Sessions without a configured database run no store at all.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use futures::{StreamExt, future::BoxFuture};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::dao::{
    match_store::{MatchDocumentStore, Snapshot, SnapshotStream},
    models::MatchDocument,
    storage::{StorageError, StorageResult},
};

/// Failures of the in-memory store.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// Switched off through [`MemoryMatchStore::set_offline`].
    #[error("in-memory document store is offline")]
    Offline,
}

impl From<MemoryStoreError> for StorageError {
    fn from(err: MemoryStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

/// Shared document held in a watch channel; every clone sees the same document.
#[derive(Clone)]
pub struct MemoryMatchStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    document: watch::Sender<Snapshot>,
    writes: AtomicUsize,
    offline: AtomicBool,
    /// Subscriptions wait until this is `true`.
    released: watch::Sender<bool>,
}

impl Default for MemoryMatchStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryMatchStore {
    /// Start with `initial` as the stored document.
    pub fn new(initial: Snapshot) -> Self {
        let (document, _rx) = watch::channel(initial);
        let (released, _rx) = watch::channel(true);
        Self {
            inner: Arc::new(MemoryInner {
                document,
                writes: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
                released,
            }),
        }
    }

    /// Current stored document.
    pub fn document(&self) -> Snapshot {
        self.inner.document.borrow().clone()
    }

    /// Overwrite the stored document as another client would.
    pub fn replace(&self, document: Snapshot) {
        self.inner.document.send_replace(document);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Make every operation fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Keep new subscriptions waiting for their first snapshot until
    /// [`release_snapshots`](Self::release_snapshots).
    pub fn hold_snapshots(&self) {
        self.inner.released.send_replace(false);
    }

    /// Let waiting subscriptions receive the current document.
    pub fn release_snapshots(&self) {
        self.inner.released.send_replace(true);
    }

    fn ensure_online(&self) -> Result<(), MemoryStoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(MemoryStoreError::Offline)
        } else {
            Ok(())
        }
    }
}

impl MatchDocumentStore for MemoryMatchStore {
    fn subscribe(&self) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut released = store.inner.released.subscribe();
            // The sender lives in `inner`, which this future keeps alive.
            let _ = released.wait_for(|open| *open).await;
            let stream =
                WatchStream::new(store.inner.document.subscribe()).map(Ok::<_, StorageError>);
            Ok(stream.boxed())
        })
    }

    fn write(&self, patch: MatchDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store.inner.document.send_modify(|current| {
                current.get_or_insert_with(MatchDocument::default).merge(patch);
            });
            store.inner.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online().map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::MatchStatus;

    #[tokio::test]
    async fn first_item_is_current_document() {
        let store = MemoryMatchStore::default();
        let mut stream = store.subscribe().await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);

        store
            .write(MatchDocument {
                status: Some(MatchStatus::Active),
                ..MatchDocument::default()
            })
            .await
            .unwrap();

        let snapshot = stream.next().await.unwrap().unwrap().unwrap();
        assert_eq!(snapshot.status, Some(MatchStatus::Active));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn offline_store_rejects_operations() {
        let store = MemoryMatchStore::default();
        store.set_offline(true);
        assert!(store.subscribe().await.is_err());
        assert!(store.write(MatchDocument::default()).await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
