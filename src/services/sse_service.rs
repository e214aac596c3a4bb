use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Identifies the target SSE stream so teardown can release stream-specific resources.
#[derive(Clone)]
pub enum StreamKind {
    Public,
    /// Holds the state so the admin token is released once the client leaves.
    Admin(SharedState),
}

/// An accepted subscription: the live receiver plus the handshake to send first.
pub struct Subscription {
    receiver: broadcast::Receiver<ServerEvent>,
    handshake: Option<ServerEvent>,
    kind: StreamKind,
}

/// Subscribe to the shared public SSE stream.
pub async fn subscribe_public(state: &SharedState) -> Subscription {
    let receiver = state.public_sse().subscribe();
    let handshake = handshake_event(Handshake {
        stream: "public".into(),
        degraded: state.is_degraded().await,
        token: None,
    });
    info!(
        subscribers = state.public_sse().subscribers(),
        "public SSE connection"
    );
    Subscription {
        receiver,
        handshake,
        kind: StreamKind::Public,
    }
}

/// Subscribe to the operator stream, issuing the token that unlocks admin routes.
///
/// Only one operator stream may be open at a time.
pub async fn subscribe_admin(state: &SharedState) -> Result<Subscription, ServiceError> {
    let token = claim_admin_token(state).await?;
    let receiver = state.admin_sse().subscribe();
    let handshake = handshake_event(Handshake {
        stream: "admin".into(),
        degraded: state.is_degraded().await,
        token: Some(token),
    });
    info!("admin SSE connection");
    Ok(Subscription {
        receiver,
        handshake,
        kind: StreamKind::Admin(state.clone()),
    })
}

fn handshake_event(handshake: Handshake) -> Option<ServerEvent> {
    ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake).ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Convert a subscription into an SSE response, forwarding events until the
/// client disconnects.
pub fn to_sse_stream(
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let Subscription {
        mut receiver,
        handshake,
        kind,
    } = subscription;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut open = match handshake {
            Some(payload) => tx.send(Ok(to_event(payload))).await.is_ok(),
            None => true,
        };

        while open {
            tokio::select! {
                _ = tx.closed() => open = false,
                recv_result = receiver.recv() => match recv_result {
                    Ok(payload) => open = tx.send(Ok(to_event(payload))).await.is_ok(),
                    Err(RecvError::Closed) => open = false,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "SSE subscriber lagged; dropping events");
                    }
                },
            }
        }

        match kind {
            StreamKind::Public => info!("public SSE stream disconnected"),
            StreamKind::Admin(state) => {
                release_admin_token(&state).await;
                info!("admin SSE stream disconnected");
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn claim_admin_token(state: &SharedState) -> Result<String, ServiceError> {
    let mut guard = state.admin_token().lock().await;
    if guard.is_some() {
        return Err(ServiceError::Unauthorized(
            "another admin SSE stream is already active".into(),
        ));
    }
    let token = Uuid::new_v4().simple().to_string();
    *guard = Some(token.clone());
    Ok(token)
}

async fn release_admin_token(state: &SharedState) {
    state.admin_token().lock().await.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn only_one_admin_stream_at_a_time() {
        let state = AppState::new(AppConfig::default());
        let first = subscribe_admin(&state).await.unwrap();
        let token = state.admin_token().lock().await.clone().unwrap();
        let handshake: serde_json::Value =
            serde_json::from_str(&first.handshake.as_ref().unwrap().data).unwrap();
        assert_eq!(handshake["token"], token.as_str());
        assert_eq!(handshake["degraded"], true);

        assert!(matches!(
            subscribe_admin(&state).await,
            Err(ServiceError::Unauthorized(_))
        ));

        release_admin_token(&state).await;
        assert!(subscribe_admin(&state).await.is_ok());
    }

    #[tokio::test]
    async fn public_handshake_has_no_token() {
        let state = AppState::new(AppConfig::default());
        let subscription = subscribe_public(&state).await;
        let handshake: serde_json::Value =
            serde_json::from_str(&subscription.handshake.unwrap().data).unwrap();
        assert_eq!(handshake["stream"], "public");
        assert!(handshake.get("token").is_none());
    }
}
