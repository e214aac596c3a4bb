//! Ticket Bingo Back binary entrypoint wiring REST, SSE and the storage backend.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_bingo_back::{
    config::AppConfig,
    dao::{
        bingo_store::{BingoStore, memory::MemoryBingoStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

/// Storage backend selected through `STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Memory,
    #[cfg(feature = "mongo-store")]
    Mongo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    let backend = select_backend()?;
    info!(?backend, "starting storage supervisor");
    spawn_storage_supervisor(app_state.clone(), backend)?;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

fn select_backend() -> anyhow::Result<Backend> {
    let requested = env::var("STORAGE_BACKEND").ok();
    match requested.as_deref().map(str::trim) {
        Some("memory") => Ok(Backend::Memory),
        #[cfg(feature = "mongo-store")]
        None | Some("") | Some("mongo") | Some("mongodb") => Ok(Backend::Mongo),
        #[cfg(not(feature = "mongo-store"))]
        None | Some("") => Ok(Backend::Memory),
        Some(other) => bail!("unsupported STORAGE_BACKEND `{other}`"),
    }
}

fn spawn_storage_supervisor(state: SharedState, backend: Backend) -> anyhow::Result<()> {
    match backend {
        Backend::Memory => {
            let store = MemoryBingoStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn BingoStore>) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        Backend::Mongo => {
            use std::time::Duration;
            use ticket_bingo_back::dao::bingo_store::mongodb::{MongoBingoStore, MongoConfig};

            let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            let lease = match env::var("CLAIM_LOCK_LEASE_SECS") {
                Ok(value) => Some(Duration::from_secs(
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("invalid CLAIM_LOCK_LEASE_SECS `{value}`"))?,
                )),
                Err(_) => None,
            };
            let connect_attempts = match env::var("MONGO_CONNECT_ATTEMPTS") {
                Ok(value) => Some(
                    value
                        .trim()
                        .parse::<u32>()
                        .with_context(|| format!("invalid MONGO_CONNECT_ATTEMPTS `{value}`"))?,
                ),
                Err(_) => None,
            };

            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let mut config = MongoConfig::from_uri(&uri, db_name.as_deref())
                        .await
                        .map_err(StorageError::from)?;
                    if let Some(lease) = lease {
                        config = config.with_claim_lock_lease(lease);
                    }
                    if let Some(attempts) = connect_attempts {
                        config = config.with_connect_attempts(attempts);
                    }
                    let store = MongoBingoStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn BingoStore>)
                }
            }));
        }
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
