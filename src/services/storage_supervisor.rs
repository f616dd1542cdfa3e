use std::{future::Future, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tracing::{info, warn};

use crate::{
    config::StoreBackend,
    dao::{match_store::MatchDocumentStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Start supervising the configured backend, if any.
pub fn spawn(state: SharedState) -> Option<JoinHandle<()>> {
    let backend = state.config().store;
    match backend {
        StoreBackend::None => {
            info!("no remote store configured; running local only");
            None
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            use crate::dao::match_store::couchdb::{CouchConfig, CouchMatchStore};

            Some(tokio::spawn(run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchMatchStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchDocumentStore>)
            })))
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use crate::dao::match_store::mongodb::{MongoConfig, MongoMatchStore};

            Some(tokio::spawn(run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoMatchStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchDocumentStore>)
            })))
        }
        #[allow(unreachable_patterns)]
        other => {
            warn!(backend = ?other, "store backend not compiled in; running local only");
            state.update_degraded(false);
            None
        }
    }
}

/// Reconnect to the document store and keep the session degraded while it is unavailable.
///
/// Every successful connection gets a fresh sync session; losing the store
/// cancels it and the local store carries on alone.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchDocumentStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_document_store(store.clone()).await;
                info!("document store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if !state.sync_running().await {
                                info!("sync session ended; starting a new one");
                                state.restart_sync().await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            warn!(error = %err, "document store health check failed");
                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!("document store reconnected after health check failure");
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "document store reconnect first attempt failed; entering degraded mode"
                                            );
                                            state.stop_sync().await;
                                            state.update_degraded(true);
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "document store reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false);
                                state.restart_sync().await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted document store reconnect attempts; staying in degraded mode"
                                );
                                state.clear_document_store().await;
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "document store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::{MemoryMatchStore, MemoryStoreError},
        state::AppState,
    };

    fn remote_state() -> SharedState {
        AppState::new(AppConfig {
            store: StoreBackend::Couch,
            ..AppConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn store_loss_enters_and_recovery_leaves_degraded_mode() {
        let state = remote_state();
        let remote = MemoryMatchStore::default();
        let connect_with = remote.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store = connect_with.clone();
            async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchDocumentStore>) }
        }));

        sleep(Duration::from_millis(100)).await;
        assert!(!state.is_degraded());

        remote.set_offline(true);
        sleep(HEALTH_POLL_INTERVAL).await;
        assert!(state.is_degraded());

        remote.set_offline(false);
        sleep(Duration::from_secs(30)).await;
        assert!(!state.is_degraded());
        assert!(state.sync_running().await);

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connections_keep_retrying() {
        let state = remote_state();
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async {
                Err::<Arc<dyn MatchDocumentStore>, _>(StorageError::from(
                    MemoryStoreError::Offline,
                ))
            }
        }));

        sleep(Duration::from_secs(8)).await;
        assert!(state.is_degraded());
        // Attempts at 0s, 1s, 3s and 7s.
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);

        supervisor.abort();
    }
}
