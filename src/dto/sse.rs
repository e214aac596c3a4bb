use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::admin::PendingClaimSummary;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `admin`).
    pub stream: String,
    /// Whether the backend is running without a storage backend.
    pub degraded: bool,
    /// Admin token returned when the stream is privileged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after the operator draws a name.
pub struct NamePickedEvent {
    pub name: String,
    pub order: u32,
    pub remaining: usize,
    pub picked_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Public notice that a claim entered the queue; carries no ticket details.
pub struct ClaimSubmittedEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Operator copy of a freshly queued claim.
pub struct ClaimQueuedEvent(pub PendingClaimSummary);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once the operator resolved a claim.
pub struct ClaimVerifiedEvent {
    pub claim_id: u64,
    pub ticket_id: Uuid,
    pub player_name: Option<String>,
    pub winner: bool,
    /// Whether the claim queue still holds pending entries.
    pub is_locked: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after the game was reset.
pub struct GameResetEvent {
    pub is_locked: bool,
}
