//! Backends of the shared match document.

#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::{models::MatchDocument, storage::StorageResult};

/// Identifier of the single live match document inside the `game` collection.
pub const MATCH_DOCUMENT_ID: &str = "current";

/// Latest remote view of the match document; `None` when it does not exist.
pub type Snapshot = Option<MatchDocument>;

/// Stream of snapshots. The first item is the document as it stands when subscribing.
pub type SnapshotStream = BoxStream<'static, StorageResult<Snapshot>>;

/// Abstraction over the shared remote document a match is mirrored to.
pub trait MatchDocumentStore: Send + Sync {
    /// Open a snapshot subscription on the match document.
    fn subscribe(&self) -> BoxFuture<'static, StorageResult<SnapshotStream>>;
    /// Merge-write the present fields of `patch`; creates the document when missing.
    fn write(&self, patch: MatchDocument) -> BoxFuture<'static, StorageResult<()>>;
    /// Liveness check polled by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
