use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` with the backend name, or `degraded` when storage is missing or failing.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(store) = state.store().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    if let Err(err) = store.health_check().await {
        warn!(error = %err, backend = store.backend(), "storage health check failed");
        return HealthResponse::degraded();
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok(store.backend())
    }
}
