use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        admin::PendingClaimSummary,
        format_system_time,
        sse::{
            ClaimQueuedEvent, ClaimSubmittedEvent, ClaimVerifiedEvent, GameResetEvent,
            NamePickedEvent, ServerEvent, SystemStatus,
        },
    },
    services::{
        arbitrator::{PendingClaim, QueuedClaim, Verification},
        game_service::PickedName,
    },
    state::SharedState,
};

const EVENT_NAME_PICKED: &str = "name.picked";
const EVENT_CLAIM_SUBMITTED: &str = "claim.submitted";
const EVENT_CLAIM_QUEUED: &str = "claim.queued";
const EVENT_CLAIM_VERIFIED: &str = "claim.verified";
const EVENT_GAME_RESET: &str = "game.reset";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a freshly drawn name to everyone.
pub fn broadcast_name_picked(state: &SharedState, picked: &PickedName) {
    let payload = NamePickedEvent {
        name: picked.name.name.clone(),
        order: picked.name.pick_order.unwrap_or_default(),
        remaining: picked.remaining,
        picked_at: picked.name.picked_at.map(format_system_time),
    };
    send_public_event(state, EVENT_NAME_PICKED, &payload);
    send_admin_event(state, EVENT_NAME_PICKED, &payload);
}

/// Announce a queued claim: position only on the public stream, full details for the operator.
pub fn broadcast_claim_submitted(state: &SharedState, queued: &QueuedClaim) {
    send_public_event(
        state,
        EVENT_CLAIM_SUBMITTED,
        &ClaimSubmittedEvent {
            queue_position: queued.queue_position,
        },
    );

    let detail = PendingClaimSummary::from(PendingClaim {
        claim: queued.claim.clone(),
        ticket: queued.ticket.clone(),
        picked_names: queued.picked_names.clone(),
    });
    send_admin_event(state, EVENT_CLAIM_QUEUED, &ClaimQueuedEvent(detail));
}

/// Broadcast the operator verdict on a claim.
pub fn broadcast_claim_verified(state: &SharedState, verification: &Verification) {
    let payload = ClaimVerifiedEvent {
        claim_id: verification.claim.id,
        ticket_id: verification.claim.ticket_id,
        player_name: verification.player_name.clone(),
        winner: verification.winner,
        is_locked: verification.pending_left != Some(0),
    };
    send_public_event(state, EVENT_CLAIM_VERIFIED, &payload);
    send_admin_event(state, EVENT_CLAIM_VERIFIED, &payload);
}

/// Broadcast that every claim, pick and assignment was cleared.
pub fn broadcast_game_reset(state: &SharedState) {
    let payload = GameResetEvent { is_locked: false };
    send_public_event(state, EVENT_GAME_RESET, &payload);
    send_admin_event(state, EVENT_GAME_RESET, &payload);
}

/// Broadcast a degraded mode change to both streams.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_public_event(state, EVENT_SYSTEM_STATUS, &payload);
    send_admin_event(state, EVENT_SYSTEM_STATUS, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_admin_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{config::AppConfig, dao::models::NameEntity, state::AppState};

    #[tokio::test]
    async fn name_picked_reaches_both_streams() {
        let state = AppState::new(AppConfig::default());
        let mut public = state.public_sse().subscribe();
        let mut admin = state.admin_sse().subscribe();

        let picked = PickedName {
            name: NameEntity {
                name: "Ada".into(),
                picked: true,
                picked_at: Some(SystemTime::now()),
                pick_order: Some(3),
            },
            remaining: 12,
        };
        broadcast_name_picked(&state, &picked);

        for event in [public.recv().await.unwrap(), admin.recv().await.unwrap()] {
            assert_eq!(event.event.as_deref(), Some(EVENT_NAME_PICKED));
            let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
            assert_eq!(body["name"], "Ada");
            assert_eq!(body["order"], 3);
            assert_eq!(body["remaining"], 12);
        }
    }

    #[tokio::test]
    async fn game_reset_clears_lock_flag_in_payload() {
        let state = AppState::new(AppConfig::default());
        let mut public = state.public_sse().subscribe();
        broadcast_game_reset(&state);
        let event = public.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_GAME_RESET));
        assert_eq!(event.data, r#"{"is_locked":false}"#);
    }
}
