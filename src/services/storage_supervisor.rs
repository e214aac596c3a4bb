use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{bingo_store::BingoStore, storage::StorageError},
    error::ServiceError,
    services::{game_service, sse_events},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, prepare it for play and keep the shared
/// state in degraded mode whenever it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn BingoStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;
    let mut first_install = true;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        if let Err(err) = prepare(&state, store.as_ref(), first_install).await {
            warn!(error = %err, backend = store.backend(), "storage preparation failed");
            sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
            continue;
        }
        first_install = false;

        state.set_store(store.clone()).await;
        sse_events::broadcast_system_status(&state, false);
        info!(
            backend = store.backend(),
            "storage connection established; leaving degraded mode"
        );
        delay = INITIAL_DELAY;

        watch_health(&state, store.as_ref()).await;

        state.clear_store().await;
        sse_events::broadcast_system_status(&state, true);
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Ready a connected store before installing it. Crash recovery only runs for
/// the first install of the process; later installs follow an outage and keep
/// the claim queue state as it is.
async fn prepare(
    state: &SharedState,
    store: &dyn BingoStore,
    first_install: bool,
) -> Result<(), ServiceError> {
    if first_install {
        game_service::prepare_store(store, state.config()).await
    } else {
        game_service::reattach_store(state, store).await
    }
}

/// Poll the installed store until it fails and cannot be reconnected.
async fn watch_health(state: &SharedState, store: &dyn BingoStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                set_degraded(state, false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        let mut reconnect_delay = INITIAL_DELAY;
        let mut reconnected = false;
        for attempt in 0..MAX_RECONNECT_ATTEMPTS {
            match store.try_reconnect().await {
                Ok(()) => {
                    info!(attempt, "storage reconnection succeeded after health check failure");
                    reconnected = true;
                    break;
                }
                Err(err) => {
                    if attempt == 0 {
                        warn!(
                            attempt, error = %err,
                            "storage reconnect first attempt failed; entering degraded mode"
                        );
                        set_degraded(state, true).await;
                    } else {
                        warn!(attempt, error = %err, "storage reconnect attempt failed");
                    }
                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                }
            }
        }

        if !reconnected {
            warn!("exhausted storage reconnect attempts; staying in degraded mode");
            return;
        }
        set_degraded(state, false).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn set_degraded(state: &SharedState, degraded: bool) {
    if state.is_degraded().await != degraded {
        state.update_degraded(degraded).await;
        sse_events::broadcast_system_status(state, degraded);
    }
}
