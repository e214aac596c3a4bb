//! DTO definitions used by the player-facing REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{NameEntity, TicketEntity},
    dto::{format_system_time, validation::validate_player_name},
    services::{
        arbitrator::ClaimOutcome,
        game_service::{GameStatus, TicketView},
    },
    state::{grid::TicketGrid, state_machine::TicketStatus},
};

/// Payload sent by a player joining the game.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub player_name: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_player_name(&self.player_name) {
            errors.add("player_name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Ticket granted to a newly registered player.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub ticket_id: Uuid,
    /// 3 rows of 9 cells, `null` for empty cells.
    #[schema(value_type = Vec<Vec<Option<String>>>)]
    pub grid: TicketGrid,
    pub player_name: String,
}

impl From<TicketEntity> for RegisterResponse {
    fn from(ticket: TicketEntity) -> Self {
        Self {
            ticket_id: ticket.id,
            grid: ticket.grid,
            player_name: ticket.player_name.unwrap_or_default(),
        }
    }
}

/// A player's ticket together with every name drawn so far.
#[derive(Debug, Serialize, ToSchema)]
pub struct TicketResponse {
    pub ticket_id: Uuid,
    pub player_name: Option<String>,
    #[schema(value_type = Vec<Vec<Option<String>>>)]
    pub grid: TicketGrid,
    pub status: TicketStatus,
    pub picked_names: Vec<String>,
}

impl From<TicketView> for TicketResponse {
    fn from(view: TicketView) -> Self {
        Self {
            ticket_id: view.ticket.id,
            player_name: view.ticket.player_name,
            grid: view.ticket.grid,
            status: view.ticket.status,
            picked_names: view.picked_names,
        }
    }
}

/// One drawn name in pick order.
#[derive(Debug, Serialize, ToSchema)]
pub struct PickedNameSummary {
    pub name: String,
    pub order: u32,
    /// RFC 3339 timestamp of the draw.
    pub picked_at: Option<String>,
}

impl From<NameEntity> for PickedNameSummary {
    fn from(entry: NameEntity) -> Self {
        Self {
            name: entry.name,
            order: entry.pick_order.unwrap_or_default(),
            picked_at: entry.picked_at.map(format_system_time),
        }
    }
}

/// Player whose claim was approved.
#[derive(Debug, Serialize, ToSchema)]
pub struct WinnerSummary {
    pub name: Option<String>,
    pub ticket_id: Uuid,
}

/// Snapshot polled by players and displays.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameStatusResponse {
    pub picked_names: Vec<PickedNameSummary>,
    /// True while at least one claim waits for the operator.
    pub is_locked: bool,
    pub winners: Vec<WinnerSummary>,
    pub last_pick_time: Option<String>,
}

impl From<GameStatus> for GameStatusResponse {
    fn from(status: GameStatus) -> Self {
        Self {
            last_pick_time: status.last_pick_time.map(format_system_time),
            picked_names: status.picked.into_iter().map(Into::into).collect(),
            is_locked: status.is_locked,
            winners: status
                .winners
                .into_iter()
                .map(|ticket| WinnerSummary {
                    name: ticket.player_name,
                    ticket_id: ticket.id,
                })
                .collect(),
        }
    }
}

/// Claim submission for a ticket believed to be fully covered.
///
/// The id is taken as free text: a malformed id is an invalid ticket like any
/// unknown one, not a rejected request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClaimRequest {
    #[schema(example = "5f0c7c3e-8d2a-4e55-9b5e-0c2f4a8e9d11")]
    pub ticket_id: String,
}

impl ClaimRequest {
    /// Ticket id, when the submitted text is a well-formed id.
    pub fn parsed_ticket_id(&self) -> Option<Uuid> {
        Uuid::parse_str(self.ticket_id.trim()).ok()
    }
}

/// Result of a claim submission. Contention is reported with `success = false`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimResponse {
    pub success: bool,
    /// Number of pending claims once this one was queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ClaimOutcome> for ClaimResponse {
    fn from(outcome: &ClaimOutcome) -> Self {
        match outcome {
            ClaimOutcome::Queued(queued) => Self {
                success: true,
                queue_position: queued.queue_position,
                message: None,
            },
            ClaimOutcome::ClaimInProgress => Self {
                success: false,
                queue_position: None,
                message: Some("Claim in progress".into()),
            },
            ClaimOutcome::InvalidTicket => Self {
                success: false,
                queue_position: None,
                message: Some("Invalid ticket".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_player_name_fails_validation() {
        let request = RegisterRequest {
            player_name: "   ".into(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("player_name"));
    }

    #[test]
    fn contention_is_not_a_success() {
        let body = serde_json::to_value(ClaimResponse::from(&ClaimOutcome::ClaimInProgress))
            .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "Claim in progress" })
        );
    }

    #[test]
    fn malformed_ticket_id_reads_as_invalid_ticket() {
        let request: ClaimRequest =
            serde_json::from_value(serde_json::json!({ "ticket_id": "ticket-42" })).unwrap();
        assert_eq!(request.parsed_ticket_id(), None);

        let body = serde_json::to_value(ClaimResponse::from(&ClaimOutcome::InvalidTicket))
            .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "Invalid ticket" })
        );
    }

    #[test]
    fn well_formed_ticket_id_is_parsed() {
        let id = Uuid::new_v4();
        let request: ClaimRequest =
            serde_json::from_value(serde_json::json!({ "ticket_id": format!(" {id} ") })).unwrap();
        assert_eq!(request.parsed_ticket_id(), Some(id));
    }
}
