use std::time::SystemTime;

use rand::seq::IndexedRandom;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        bingo_store::BingoStore,
        models::{CLAIM_LOCK_KEY, NameEntity, TicketEntity},
    },
    error::ServiceError,
    services::{arbitrator, sse_events, ticket_generator::pre_generate_tickets},
    state::{AppState, SharedState},
};

/// A ticket together with every name drawn so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketView {
    pub ticket: TicketEntity,
    pub picked_names: Vec<String>,
}

/// Game snapshot served to players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStatus {
    /// Drawn names in pick order.
    pub picked: Vec<NameEntity>,
    pub is_locked: bool,
    pub winners: Vec<TicketEntity>,
    pub last_pick_time: Option<SystemTime>,
}

/// A name freshly drawn by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedName {
    pub name: NameEntity,
    /// Names still undrawn after this pick.
    pub remaining: usize,
}

/// Outcome of [`provision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProvisionReport {
    pub names_seeded: usize,
    pub tickets_created: usize,
}

/// Keep only drawn names, ordered by pick order.
pub fn names_in_pick_order(names: Vec<NameEntity>) -> Vec<NameEntity> {
    let mut picked = names
        .into_iter()
        .filter(|entry| entry.picked)
        .collect::<Vec<_>>();
    picked.sort_by_key(|entry| entry.pick_order);
    picked
}

/// Fetch a ticket by id with the names drawn so far.
pub async fn get_ticket(state: &SharedState, id: Uuid) -> Result<TicketView, ServiceError> {
    let store = state.require_store().await?;
    state.bounded(load_ticket(store.as_ref(), id)).await
}

async fn load_ticket(store: &dyn BingoStore, id: Uuid) -> Result<TicketView, ServiceError> {
    let ticket = store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("ticket `{id}` not found")))?;
    let picked_names = names_in_pick_order(store.list_names().await?)
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    Ok(TicketView {
        ticket,
        picked_names,
    })
}

/// Snapshot of drawn names, the claim lock flag and the winners.
pub async fn get_game_status(state: &SharedState) -> Result<GameStatus, ServiceError> {
    let store = state.require_store().await?;
    state.bounded(load_status(store.as_ref())).await
}

async fn load_status(store: &dyn BingoStore) -> Result<GameStatus, ServiceError> {
    let picked = names_in_pick_order(store.list_names().await?);
    let is_locked = matches!(
        store.read_state(CLAIM_LOCK_KEY).await?,
        Some(Value::Bool(true))
    );
    let winners = store.list_winners().await?;
    let last_pick_time = picked.last().and_then(|entry| entry.picked_at);

    Ok(GameStatus {
        picked,
        is_locked,
        winners,
        last_pick_time,
    })
}

/// Draw one undrawn name uniformly at random.
pub async fn pick_name(state: &SharedState) -> Result<PickedName, ServiceError> {
    let store = state.require_store().await?;
    let picked = state.bounded(draw_name(store.as_ref())).await?;

    info!(
        name = %picked.name.name,
        order = picked.name.pick_order,
        remaining = picked.remaining,
        "name picked"
    );
    sse_events::broadcast_name_picked(state, &picked);
    Ok(picked)
}

async fn draw_name(store: &dyn BingoStore) -> Result<PickedName, ServiceError> {
    let names = store.list_names().await?;
    let unpicked = names
        .iter()
        .filter(|entry| !entry.picked)
        .collect::<Vec<_>>();
    let choice = {
        let mut rng = rand::rng();
        unpicked.choose(&mut rng).map(|entry| entry.name.clone())
    };
    let Some(name) = choice else {
        return Err(ServiceError::NoNamesLeft);
    };
    let remaining = unpicked.len() - 1;

    match store.mark_name_picked(name.clone(), SystemTime::now()).await? {
        Some(entry) => Ok(PickedName {
            name: entry,
            remaining,
        }),
        None => Err(ServiceError::InvalidState(format!(
            "name `{name}` was picked concurrently"
        ))),
    }
}

/// Seed the name pool and, on an empty store, pre-generate the tickets.
///
/// Existing tickets are never regenerated.
pub async fn provision(
    store: &dyn BingoStore,
    config: &AppConfig,
) -> Result<ProvisionReport, ServiceError> {
    let names_seeded = store.seed_names(config.names().to_vec()).await?;
    if store.count_tickets().await? > 0 {
        return Ok(ProvisionReport {
            names_seeded,
            tickets_created: 0,
        });
    }

    let grids = {
        let mut rng = rand::rng();
        pre_generate_tickets(config.names(), config.ticket_count(), &mut rng)?
    };
    let now = SystemTime::now();
    let tickets = grids
        .into_iter()
        .map(|grid| TicketEntity::provisioned(grid, now))
        .collect::<Vec<_>>();
    let tickets_created = tickets.len();
    store.insert_tickets(tickets).await?;

    Ok(ProvisionReport {
        names_seeded,
        tickets_created,
    })
}

/// Clear state a crashed process may have left behind: the claim lock flag
/// and any hard claim lock still registered in the store.
pub async fn recover(store: &dyn BingoStore) -> Result<(), ServiceError> {
    store
        .write_state(CLAIM_LOCK_KEY, Value::Bool(false))
        .await?;
    store.release_stale_locks().await?;
    Ok(())
}

/// Bring the store into a playable state when the process starts.
///
/// Recovery failures are returned; a name pool too small to build tickets is
/// only logged so the server keeps serving.
pub async fn prepare_store(store: &dyn BingoStore, config: &AppConfig) -> Result<(), ServiceError> {
    recover(store).await?;
    provision_logged(store, config).await
}

/// Bring a store back after an outage within the same process.
///
/// Claims queued before the outage are still awaiting review, so the claim
/// lock flag is realigned with the queue instead of being cleared.
pub async fn reattach_store(state: &AppState, store: &dyn BingoStore) -> Result<(), ServiceError> {
    provision_logged(store, state.config()).await?;
    let pending = arbitrator::sync_claim_flag(state, store).await?;
    debug!(pending, "claim lock flag realigned after reconnect");
    Ok(())
}

async fn provision_logged(store: &dyn BingoStore, config: &AppConfig) -> Result<(), ServiceError> {
    match provision(store, config).await {
        Ok(report) => {
            info!(
                names_seeded = report.names_seeded,
                tickets_created = report.tickets_created,
                "storage provisioned"
            );
            Ok(())
        }
        Err(ServiceError::Provisioning(err)) => {
            warn!(error = %err, "ticket provisioning skipped");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
