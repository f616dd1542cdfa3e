use std::{pin::Pin, sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    change_stream::{
        ChangeStream,
        event::{ChangeStreamEvent, OperationType},
    },
    options::FullDocumentType,
};
use tokio::{sync::RwLock, time::sleep};
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, set_document},
};
use crate::dao::{
    match_store::{MATCH_DOCUMENT_ID, MatchDocumentStore, Snapshot, SnapshotStream},
    models::MatchDocument,
    storage::{StorageError, StorageResult},
};

const MATCH_COLLECTION_NAME: &str = "game";
const FEED_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
const FEED_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_FEED_FAILURES: u32 = 3;

type DocumentFeed = Pin<Box<ChangeStream<ChangeStreamEvent<MongoMatchDocument>>>>;

/// Match document kept in the `game` collection; change streams need a replica set.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoMatchDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn update_document(&self, patch: &MatchDocument) -> MongoResult<()> {
        let set = set_document(patch);
        if set.is_empty() {
            return Ok(());
        }

        self.collection()
            .await
            .update_one(doc! { "_id": MATCH_DOCUMENT_ID }, doc! { "$set": set })
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpdateDocument {
                id: MATCH_DOCUMENT_ID,
                source,
            })?;
        Ok(())
    }

    /// Open the change stream first, then read the document, so no update
    /// can fall between the two.
    async fn open_feed(&self) -> MongoResult<(DocumentFeed, Snapshot)> {
        let collection = self.collection().await;

        let feed = collection
            .watch()
            .pipeline([doc! { "$match": { "documentKey._id": MATCH_DOCUMENT_ID } }])
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(|source| MongoDaoError::WatchDocument {
                id: MATCH_DOCUMENT_ID,
                source,
            })?;

        let snapshot = collection
            .find_one(doc! { "_id": MATCH_DOCUMENT_ID })
            .await
            .map_err(|source| MongoDaoError::LoadDocument {
                id: MATCH_DOCUMENT_ID,
                source,
            })?
            .map(|document| document.body);

        Ok((Box::pin(feed), snapshot))
    }
}

/// Snapshot carried by a change event, or `None` when the event says nothing
/// about the document body.
fn snapshot_of(event: ChangeStreamEvent<MongoMatchDocument>) -> Option<Snapshot> {
    match event.operation_type {
        OperationType::Delete => Some(None),
        OperationType::Insert | OperationType::Update | OperationType::Replace => event
            .full_document
            .map(|document| Some(document.body)),
        other => {
            debug!(operation = ?other, "ignoring change stream event");
            None
        }
    }
}

/// Snapshots from `feed`, starting with `first`. A failed or closed change
/// stream is reopened, which restates the document; after
/// [`MAX_FEED_FAILURES`] failed reopens in a row the feed ends.
fn document_feed(
    store: MongoMatchStore,
    feed: Option<DocumentFeed>,
    first: Snapshot,
) -> SnapshotStream {
    let stream = async_stream::stream! {
        yield Ok(first);

        let mut feed = feed;
        let mut delay = FEED_RETRY_INITIAL_DELAY;
        let mut failures = 0;
        loop {
            let Some(current) = feed.as_mut() else {
                sleep(delay).await;
                match store.open_feed().await {
                    Ok((reopened, snapshot)) => {
                        delay = FEED_RETRY_INITIAL_DELAY;
                        failures = 0;
                        feed = Some(reopened);
                        yield Ok(snapshot);
                    }
                    Err(err) => {
                        failures += 1;
                        delay = (delay * 2).min(FEED_RETRY_MAX_DELAY);
                        yield Err(StorageError::from(err));
                        if failures >= MAX_FEED_FAILURES {
                            warn!(failures, "giving up on the MongoDB change stream");
                            break;
                        }
                    }
                }
                continue;
            };

            match current.next().await {
                Some(Ok(event)) => {
                    if let Some(snapshot) = snapshot_of(event) {
                        yield Ok(snapshot);
                    }
                }
                Some(Err(source)) => {
                    warn!(error = %source, "MongoDB change stream failed; reopening");
                    feed = None;
                    yield Err(StorageError::from(MongoDaoError::WatchDocument {
                        id: MATCH_DOCUMENT_ID,
                        source,
                    }));
                }
                None => {
                    warn!("MongoDB change stream closed; reopening");
                    feed = None;
                }
            }
        }
    };

    Box::pin(stream)
}

impl MatchDocumentStore for MongoMatchStore {
    fn subscribe(&self) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        let store = self.clone();
        Box::pin(async move {
            let (feed, first) = store.open_feed().await?;
            Ok(document_feed(store, Some(feed), first))
        })
    }

    fn write(&self, patch: MatchDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_document(&patch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
