//! DTO definitions used by the operator REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    services::{
        arbitrator::{PendingClaim, Verification},
        game_service::PickedName,
    },
    state::grid::TicketGrid,
};

/// Result of drawing one name from the pool.
#[derive(Debug, Serialize, ToSchema)]
pub struct PickNameResponse {
    pub picked_name: String,
    /// Names still waiting to be drawn.
    pub remaining: usize,
    pub order: u32,
}

impl From<PickedName> for PickNameResponse {
    fn from(picked: PickedName) -> Self {
        Self {
            order: picked.name.pick_order.unwrap_or_default(),
            picked_name: picked.name.name,
            remaining: picked.remaining,
        }
    }
}

/// Pending claim with everything the operator needs to check it.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingClaimSummary {
    pub claim_id: u64,
    pub ticket_id: Uuid,
    pub player_name: Option<String>,
    #[schema(value_type = Vec<Vec<Option<String>>>)]
    pub grid: TicketGrid,
    pub picked_names: Vec<String>,
    pub claimed_at: String,
    /// Whether every name on the ticket was drawn when the claim was filed.
    pub is_valid: bool,
}

impl From<PendingClaim> for PendingClaimSummary {
    fn from(pending: PendingClaim) -> Self {
        Self {
            claim_id: pending.claim.id,
            ticket_id: pending.claim.ticket_id,
            player_name: pending.ticket.player_name,
            grid: pending.ticket.grid,
            picked_names: pending.picked_names,
            claimed_at: format_system_time(pending.claim.claimed_at),
            is_valid: pending.claim.is_valid,
        }
    }
}

/// Operator verdict on a queued claim.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyClaimRequest {
    pub claim_id: u64,
    /// `true` approves the claim, `false` returns the ticket to play.
    #[serde(alias = "verdict")]
    pub is_valid: bool,
}

/// Outcome of a claim verification.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyClaimResponse {
    pub success: bool,
    pub winner: bool,
}

impl From<&Verification> for VerifyClaimResponse {
    fn from(verification: &Verification) -> Self {
        Self {
            success: true,
            winner: verification.winner,
        }
    }
}

/// Generic acknowledgement used by operator endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
}
