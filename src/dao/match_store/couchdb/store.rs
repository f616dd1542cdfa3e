use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, from_value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::dao::{
    match_store::{MATCH_DOCUMENT_ID, MatchDocumentStore, Snapshot, SnapshotStream},
    models::MatchDocument,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CHANGES_PATH, ChangeRow, ChangesResponse, LONGPOLL_TIMEOUT_MS},
};

const MAX_MERGE_ATTEMPTS: u32 = 5;
const FEED_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
const FEED_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_FEED_FAILURES: u32 = 3;

type JsonObject = Map<String, Value>;

/// Match document kept as a single CouchDB document.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    doc_id: Arc<str>,
}

impl CouchMatchStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            doc_id: Arc::from(MATCH_DOCUMENT_ID),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn database_request(&self, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, self.database);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let response = self
            .database_request(Method::GET)
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .database_request(Method::PUT)
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means a concurrent client created it first.
                let status = create.status();
                if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus { database, status })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let doc_id = self.doc_id.as_ref();
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let doc_id = self.doc_id.as_ref();
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Read-merge-write against the latest revision, retrying on conflicts.
    ///
    /// Fields the patch does not carry (including ones this service does not
    /// know about) are kept as they are.
    async fn merge_document(&self, patch: &MatchDocument) -> CouchResult<()> {
        let path = self.doc_id.to_string();
        let patch = match serde_json::to_value(patch)
            .map_err(|source| CouchDaoError::SerializeValue { path, source })?
        {
            Value::Object(fields) => fields,
            _ => JsonObject::new(),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut document = self.get_document::<JsonObject>().await?.unwrap_or_default();
            document.extend(patch.clone());
            document.insert("_id".into(), Value::String(self.doc_id.to_string()));

            match self.put_document(&document).await {
                Err(CouchDaoError::Conflict { .. }) if attempts < MAX_MERGE_ATTEMPTS => {
                    debug!(attempts, "CouchDB revision conflict; merging again");
                }
                result => return result,
            }
        }
    }

    /// Query the changes feed for the match document.
    ///
    /// Without `since` the feed returns the document as it stands; with it the
    /// request long-polls until the document changes or the timeout elapses.
    async fn changes(&self, since: Option<&str>) -> CouchResult<ChangesResponse> {
        let mut query = vec![
            ("filter", "_doc_ids".to_string()),
            ("include_docs", "true".to_string()),
        ];
        if let Some(since) = since {
            query.push(("feed", "longpoll".to_string()));
            query.push(("since", since.to_string()));
            query.push(("timeout", LONGPOLL_TIMEOUT_MS.to_string()));
        }

        let response = self
            .request(Method::POST, CHANGES_PATH)
            .query(&query)
            .json(&json!({ "doc_ids": [self.doc_id.as_ref()] }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES_PATH.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES_PATH.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES_PATH.to_string(),
                source,
            })
    }

    fn snapshot_of(&self, row: ChangeRow) -> CouchResult<Snapshot> {
        if row.deleted {
            return Ok(None);
        }
        row.doc
            .map(from_value::<MatchDocument>)
            .transpose()
            .map_err(|source| CouchDaoError::DeserializeValue {
                path: self.doc_id.to_string(),
                source,
            })
    }

    /// Long-poll the changes feed from `since`, starting with `first`.
    ///
    /// The feed ends after [`MAX_FEED_FAILURES`] consecutive failed polls; the
    /// storage supervisor then decides whether to start a new session.
    fn feed(self, mut since: String, first: Snapshot) -> SnapshotStream {
        let store = self;
        let stream = async_stream::stream! {
            yield Ok(first);

            let mut delay = FEED_RETRY_INITIAL_DELAY;
            let mut failures = 0;
            loop {
                match store.changes(Some(&since)).await {
                    Ok(response) => {
                        delay = FEED_RETRY_INITIAL_DELAY;
                        failures = 0;
                        since = response.since_token();
                        match store.latest_snapshot(response) {
                            Ok(Some(snapshot)) => yield Ok(snapshot),
                            Ok(None) => {}
                            Err(err) => yield Err(StorageError::from(err)),
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        warn!(
                            error = %err,
                            failures,
                            retry_in = ?delay,
                            "CouchDB changes feed failed"
                        );
                        yield Err(StorageError::from(err));
                        if failures >= MAX_FEED_FAILURES {
                            warn!("giving up on the CouchDB changes feed");
                            break;
                        }
                        sleep(delay).await;
                        delay = (delay * 2).min(FEED_RETRY_MAX_DELAY);
                    }
                }
            }
        };

        Box::pin(stream)
    }

    fn latest_snapshot(&self, response: ChangesResponse) -> CouchResult<Option<Snapshot>> {
        response
            .latest_for(&self.doc_id)
            .map(|row| self.snapshot_of(row))
            .transpose()
    }
}

impl MatchDocumentStore for CouchMatchStore {
    fn subscribe(&self) -> BoxFuture<'static, StorageResult<SnapshotStream>> {
        let store = self.clone();
        Box::pin(async move {
            let initial = store.changes(None).await?;
            let since = initial.since_token();
            let first = store.latest_snapshot(initial)?.unwrap_or_default();
            Ok(store.feed(since, first))
        })
    }

    fn write(&self, patch: MatchDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.merge_document(&patch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .database_request(Method::GET)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::state::match_state::MatchStatus;

    fn offline_store() -> CouchMatchStore {
        CouchMatchStore {
            client: Client::new(),
            base_url: Arc::from("http://127.0.0.1:9"),
            database: Arc::from("game"),
            auth: None,
            doc_id: Arc::from(MATCH_DOCUMENT_ID),
        }
    }

    #[tokio::test]
    async fn feed_starts_with_the_loaded_document() {
        let first = MatchDocument {
            status: Some(MatchStatus::Active),
            ..MatchDocument::default()
        };
        let mut feed = offline_store().feed("0".into(), Some(first.clone()));

        let item = feed.next().await.unwrap().unwrap();
        assert_eq!(item, Some(first));
    }
}
