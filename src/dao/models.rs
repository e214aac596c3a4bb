use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    grid::TicketGrid,
    state_machine::{ClaimStatus, TicketStatus},
};

/// GameState key holding the logical (advisory) claim lock flag.
pub const CLAIM_LOCK_KEY: &str = "claim_lock";

/// A name from the shared pool, identified by its text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameEntity {
    /// Unique name text.
    pub name: String,
    /// Whether the operator already drew this name.
    pub picked: bool,
    /// When the name was drawn.
    pub picked_at: Option<SystemTime>,
    /// Position of the name in the global pick sequence (starting at 1).
    pub pick_order: Option<u32>,
}

impl NameEntity {
    /// Build an unpicked pool entry.
    pub fn unpicked(name: String) -> Self {
        Self {
            name,
            picked: false,
            picked_at: None,
            pick_order: None,
        }
    }
}

/// A ticket row, created unassigned at provisioning time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketEntity {
    /// Opaque ticket identifier.
    pub id: Uuid,
    /// Names printed on the ticket.
    pub grid: TicketGrid,
    /// Player holding the ticket, once registered.
    pub player_name: Option<String>,
    /// Whether a player was granted this ticket.
    pub is_assigned: bool,
    /// Position of the ticket in the claim pipeline.
    pub status: TicketStatus,
    /// When a player was granted the ticket.
    pub assigned_at: Option<SystemTime>,
    /// When the last claim was filed for the ticket.
    pub claimed_at: Option<SystemTime>,
    /// Provisioning timestamp.
    pub created_at: SystemTime,
}

impl TicketEntity {
    /// Build a fresh unassigned, active ticket around `grid`.
    pub fn provisioned(grid: TicketGrid, created_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid,
            player_name: None,
            is_assigned: false,
            status: TicketStatus::Active,
            assigned_at: None,
            claimed_at: None,
            created_at,
        }
    }

    /// Return the ticket to its provisioned state, keeping id and grid.
    pub fn reset(&mut self) {
        self.player_name = None;
        self.is_assigned = false;
        self.status = TicketStatus::Active;
        self.assigned_at = None;
        self.claimed_at = None;
    }
}

/// Claim data supplied by the arbitrator; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClaim {
    /// Ticket the claim was filed for.
    pub ticket_id: Uuid,
    /// Submission time.
    pub claimed_at: SystemTime,
    /// Whether every name on the ticket was picked at submission time.
    pub is_valid: bool,
}

/// Entry of the claim queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimEntity {
    /// Auto-increment identifier.
    pub id: u64,
    /// Ticket the claim was filed for.
    pub ticket_id: Uuid,
    /// Submission time.
    pub claimed_at: SystemTime,
    /// Review status.
    pub status: ClaimStatus,
    /// Whether every name on the ticket was picked at submission time.
    pub is_valid: bool,
    /// Operator that resolved the claim.
    pub verified_by: Option<String>,
    /// Resolution time.
    pub verified_at: Option<SystemTime>,
}

impl ClaimEntity {
    /// Materialise a queued entry from `claim` with the allocated `id`.
    pub fn pending(id: u64, claim: NewClaim) -> Self {
        Self {
            id,
            ticket_id: claim.ticket_id,
            claimed_at: claim.claimed_at,
            status: ClaimStatus::Pending,
            is_valid: claim.is_valid,
            verified_by: None,
            verified_at: None,
        }
    }
}

/// Outcome of a compare-and-set claim resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResolution {
    /// The claim was pending and is now resolved.
    Resolved(ClaimEntity),
    /// The claim had already left `pending`.
    AlreadyResolved(ClaimStatus),
    /// No claim with this id exists.
    Missing,
}
