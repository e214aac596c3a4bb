use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle of a ticket while the game runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// In play; the holder may submit a claim.
    Active,
    /// A claim for this ticket is waiting for the operator.
    Claimed,
    /// The operator approved the claim.
    Winner,
}

/// Events that move a ticket between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    /// The holder submitted a claim.
    ClaimSubmitted,
    /// The operator approved the pending claim.
    ClaimApproved,
    /// The operator rejected the pending claim; the ticket returns to play.
    ClaimRejected,
}

/// Error returned when an event cannot be applied to a ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while ticket is {from}")]
pub struct InvalidTransition {
    /// Status the ticket was in.
    pub from: TicketStatus,
    /// Event that was refused.
    pub event: TicketEvent,
}

impl TicketStatus {
    /// Compute the status reached by applying `event`.
    pub fn apply(self, event: TicketEvent) -> Result<TicketStatus, InvalidTransition> {
        use TicketEvent::*;
        use TicketStatus::*;

        match (self, event) {
            (Active, ClaimSubmitted) => Ok(Claimed),
            (Claimed, ClaimApproved) => Ok(Winner),
            (Claimed, ClaimRejected) => Ok(Active),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Claimed => "claimed",
            TicketStatus::Winner => "winner",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when a stored status label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status label `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(TicketStatus::Active),
            "claimed" => Ok(TicketStatus::Claimed),
            "winner" => Ok(TicketStatus::Winner),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Lifecycle of a claim queue entry. Both resolved states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Waiting for the operator.
    Pending,
    /// Approved by the operator.
    Verified,
    /// Rejected by the operator.
    Rejected,
}

/// Error returned when resolving a claim that already left `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("claim already resolved as {0}")]
pub struct AlreadyResolved(pub ClaimStatus);

impl ClaimStatus {
    /// Resolve a pending claim with the operator verdict.
    pub fn resolve(self, approved: bool) -> Result<ClaimStatus, AlreadyResolved> {
        match self {
            ClaimStatus::Pending if approved => Ok(ClaimStatus::Verified),
            ClaimStatus::Pending => Ok(ClaimStatus::Rejected),
            terminal => Err(AlreadyResolved(terminal)),
        }
    }

    /// Ticket event matching the claim resolution.
    pub fn ticket_event(self) -> Option<TicketEvent> {
        match self {
            ClaimStatus::Pending => None,
            ClaimStatus::Verified => Some(TicketEvent::ClaimApproved),
            ClaimStatus::Rejected => Some(TicketEvent::ClaimRejected),
        }
    }

    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Verified => "verified",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ClaimStatus::Pending),
            "verified" => Ok(ClaimStatus::Verified),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_claim_path() {
        let claimed = TicketStatus::Active
            .apply(TicketEvent::ClaimSubmitted)
            .unwrap();
        assert_eq!(claimed, TicketStatus::Claimed);
        assert_eq!(
            claimed.apply(TicketEvent::ClaimApproved).unwrap(),
            TicketStatus::Winner
        );
    }

    #[test]
    fn rejected_claim_returns_ticket_to_play() {
        let status = TicketStatus::Claimed
            .apply(TicketEvent::ClaimRejected)
            .unwrap();
        assert_eq!(status, TicketStatus::Active);
    }

    #[test]
    fn claim_on_non_active_ticket_is_refused() {
        for from in [TicketStatus::Claimed, TicketStatus::Winner] {
            let err = from.apply(TicketEvent::ClaimSubmitted).unwrap_err();
            assert_eq!(err.from, from);
            assert_eq!(err.event, TicketEvent::ClaimSubmitted);
        }
    }

    #[test]
    fn winner_is_terminal() {
        assert!(
            TicketStatus::Winner
                .apply(TicketEvent::ClaimRejected)
                .is_err()
        );
        assert!(
            TicketStatus::Winner
                .apply(TicketEvent::ClaimApproved)
                .is_err()
        );
    }

    #[test]
    fn claims_resolve_once() {
        let verified = ClaimStatus::Pending.resolve(true).unwrap();
        assert_eq!(verified, ClaimStatus::Verified);
        assert_eq!(
            verified.resolve(false).unwrap_err(),
            AlreadyResolved(ClaimStatus::Verified)
        );
        assert_eq!(
            ClaimStatus::Pending.resolve(false).unwrap(),
            ClaimStatus::Rejected
        );
    }

    #[test]
    fn labels_round_trip() {
        for status in [
            TicketStatus::Active,
            TicketStatus::Claimed,
            TicketStatus::Winner,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("lost".parse::<ClaimStatus>().is_err());
    }
}
