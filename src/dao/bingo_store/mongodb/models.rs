use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{ClaimEntity, NameEntity, TicketEntity},
    state::grid::TicketGrid,
};

pub const NAME_COLLECTION_NAME: &str = "names";
pub const TICKET_COLLECTION_NAME: &str = "tickets";
pub const CLAIM_COLLECTION_NAME: &str = "claim_queue";
pub const STATE_COLLECTION_NAME: &str = "game_state";
pub const LOCK_COLLECTION_NAME: &str = "locks";
pub const COUNTER_COLLECTION_NAME: &str = "counters";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoNameDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub picked: bool,
    pub picked_at: Option<DateTime>,
    pub pick_order: Option<i64>,
}

impl From<MongoNameDocument> for NameEntity {
    fn from(value: MongoNameDocument) -> Self {
        Self {
            name: value.name,
            picked: value.picked,
            picked_at: value.picked_at.map(DateTime::to_system_time),
            pick_order: value
                .pick_order
                .and_then(|order| u32::try_from(order).ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTicketDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub grid: Vec<Vec<Option<String>>>,
    pub player_name: Option<String>,
    pub is_assigned: bool,
    pub status: String,
    pub assigned_at: Option<DateTime>,
    pub claimed_at: Option<DateTime>,
    pub created_at: DateTime,
}

impl From<TicketEntity> for MongoTicketDocument {
    fn from(value: TicketEntity) -> Self {
        Self {
            id: value.id.to_string(),
            grid: value.grid.into(),
            player_name: value.player_name,
            is_assigned: value.is_assigned,
            status: value.status.as_str().to_owned(),
            assigned_at: value.assigned_at.map(DateTime::from_system_time),
            claimed_at: value.claimed_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoTicketDocument> for TicketEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTicketDocument) -> Result<Self, Self::Error> {
        let corrupted = |message: String| MongoDaoError::CorruptedDocument {
            collection: TICKET_COLLECTION_NAME,
            message,
        };

        let id = Uuid::parse_str(&value.id)
            .map_err(|err| corrupted(format!("ticket id `{}`: {err}", value.id)))?;
        let grid = TicketGrid::try_from(value.grid)
            .map_err(|err| corrupted(format!("ticket `{id}` grid: {err}")))?;
        let status = value
            .status
            .parse()
            .map_err(|err| corrupted(format!("ticket `{id}`: {err}")))?;

        Ok(Self {
            id,
            grid,
            player_name: value.player_name,
            is_assigned: value.is_assigned,
            status,
            assigned_at: value.assigned_at.map(DateTime::to_system_time),
            claimed_at: value.claimed_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoClaimDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub ticket_id: String,
    pub claimed_at: DateTime,
    pub status: String,
    pub is_valid: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime>,
}

impl From<ClaimEntity> for MongoClaimDocument {
    fn from(value: ClaimEntity) -> Self {
        Self {
            id: value.id as i64,
            ticket_id: value.ticket_id.to_string(),
            claimed_at: DateTime::from_system_time(value.claimed_at),
            status: value.status.as_str().to_owned(),
            is_valid: value.is_valid,
            verified_by: value.verified_by,
            verified_at: value.verified_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoClaimDocument> for ClaimEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoClaimDocument) -> Result<Self, Self::Error> {
        let corrupted = |message: String| MongoDaoError::CorruptedDocument {
            collection: CLAIM_COLLECTION_NAME,
            message,
        };

        let ticket_id = Uuid::parse_str(&value.ticket_id)
            .map_err(|err| corrupted(format!("claim {} ticket id: {err}", value.id)))?;
        let status = value
            .status
            .parse()
            .map_err(|err| corrupted(format!("claim {}: {err}", value.id)))?;

        Ok(Self {
            id: value.id as u64,
            ticket_id,
            claimed_at: value.claimed_at.to_system_time(),
            status,
            is_valid: value.is_valid,
            verified_by: value.verified_by,
            verified_at: value.verified_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStateDocument {
    #[serde(rename = "_id")]
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCounterDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}
