pub mod grid;
mod sse;
pub mod state_machine;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;

use crate::{
    config::AppConfig,
    dao::{bingo_store::BingoStore, storage::StorageResult},
    error::ServiceError,
};

pub use self::sse::EventHub;
use self::sse::SseState;

pub type SharedState = Arc<AppState>;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central application state holding the storage handle and event hubs.
///
/// Game entities are never cached here: every operation goes back to the store.
pub struct AppState {
    store: RwLock<Option<Arc<dyn BingoStore>>>,
    sse: SseState,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    operation_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::build(config, None, DEFAULT_OPERATION_TIMEOUT)
    }

    /// Construct a state with `store` already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn BingoStore>) -> SharedState {
        Self::build(config, Some(store), DEFAULT_OPERATION_TIMEOUT)
    }

    /// Like [`AppState::with_store`], with a custom limit for each storage call.
    pub fn with_store_and_timeout(
        config: AppConfig,
        store: Arc<dyn BingoStore>,
        operation_timeout: Duration,
    ) -> SharedState {
        Self::build(config, Some(store), operation_timeout)
    }

    fn build(
        config: AppConfig,
        store: Option<Arc<dyn BingoStore>>,
        operation_timeout: Duration,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        Arc::new(Self {
            store: RwLock::new(store),
            sse: SseState::new(64, 64),
            degraded: degraded_tx,
            config,
            operation_timeout: Some(operation_timeout),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn BingoStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the current store or fail with [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn BingoStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn BingoStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow() || self.store.read().await.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &EventHub {
        self.sse.public()
    }

    /// Broadcast hub used for the admin SSE stream.
    pub fn admin_sse(&self) -> &EventHub {
        self.sse.admin().hub()
    }

    /// Token guard that ensures a single admin SSE subscriber at a time.
    pub fn admin_token(&self) -> &Mutex<Option<String>> {
        self.sse.admin().token()
    }

    /// Run a single store call under the operation timeout.
    ///
    /// Multi-step sequences bound each call separately, so a timeout surfaces
    /// as an error between steps instead of cancelling the sequence midway.
    pub async fn bounded_call<Fut, T>(&self, call: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = StorageResult<T>>,
    {
        self.bounded(async { call.await.map_err(ServiceError::from) })
            .await
    }

    /// Run one storage-backed unit of work under the operation timeout.
    pub async fn bounded<Fut, T>(&self, work: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.operation_timeout {
            Some(limit) => timeout(limit, work)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => work.await,
        }
    }
}
