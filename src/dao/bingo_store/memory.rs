//! In-process store backing single-instance deployments and the test suite.
//!
//! The claim lock lives in this process, so it only serialises claims for one
//! arbitrator instance. Multi-instance deployments need a shared backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::SystemTime,
};

use dashmap::DashSet;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    dao::{
        bingo_store::BingoStore,
        models::{ClaimEntity, ClaimResolution, NameEntity, NewClaim, TicketEntity},
        storage::StorageResult,
    },
    state::state_machine::{ClaimStatus, TicketStatus},
};

#[derive(Clone, Default)]
pub struct MemoryBingoStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<Tables>,
    /// Ticket rows currently held by an in-flight registration.
    row_locks: DashSet<Uuid>,
    claim_lock: Mutex<Option<Uuid>>,
}

#[derive(Default)]
struct Tables {
    names: IndexMap<String, NameEntity>,
    tickets: IndexMap<Uuid, TicketEntity>,
    claims: BTreeMap<u64, ClaimEntity>,
    last_claim_id: u64,
    game_state: HashMap<String, Value>,
}

/// Row lock released on drop, including when the registration future is cancelled.
struct RowLock<'a> {
    locks: &'a DashSet<Uuid>,
    id: Uuid,
}

impl<'a> RowLock<'a> {
    fn try_acquire(locks: &'a DashSet<Uuid>, id: Uuid) -> Option<Self> {
        locks.insert(id).then_some(Self { locks, id })
    }
}

impl Drop for RowLock<'_> {
    fn drop(&mut self) {
        self.locks.remove(&self.id);
    }
}

impl MemoryBingoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    async fn assign_free_ticket(
        &self,
        player_name: String,
        at: SystemTime,
    ) -> Option<TicketEntity> {
        let candidate = {
            let tables = self.tables.read().await;
            tables
                .tickets
                .values()
                .find(|ticket| !ticket.is_assigned)
                .map(|ticket| ticket.id)
        }?;

        // NOWAIT: give up instead of queueing behind another registration.
        let _row = RowLock::try_acquire(&self.row_locks, candidate)?;

        let mut tables = self.tables.write().await;
        let ticket = tables.tickets.get_mut(&candidate)?;
        if ticket.is_assigned {
            return None;
        }
        ticket.is_assigned = true;
        ticket.player_name = Some(player_name);
        ticket.assigned_at = Some(at);
        Some(ticket.clone())
    }

    async fn mark_name_picked(&self, name: &str, at: SystemTime) -> Option<NameEntity> {
        let mut tables = self.tables.write().await;
        let next_order = tables
            .names
            .values()
            .filter_map(|entry| entry.pick_order)
            .max()
            .unwrap_or(0)
            + 1;

        let entry = tables.names.get_mut(name)?;
        if entry.picked {
            return None;
        }
        entry.picked = true;
        entry.picked_at = Some(at);
        entry.pick_order = Some(next_order);
        Some(entry.clone())
    }

    async fn resolve_claim(
        &self,
        id: u64,
        to: ClaimStatus,
        verifier: String,
        at: SystemTime,
    ) -> ClaimResolution {
        let mut tables = self.tables.write().await;
        let Some(claim) = tables.claims.get_mut(&id) else {
            return ClaimResolution::Missing;
        };
        if claim.status != ClaimStatus::Pending {
            return ClaimResolution::AlreadyResolved(claim.status);
        }
        claim.status = to;
        claim.verified_by = Some(verifier);
        claim.verified_at = Some(at);
        ClaimResolution::Resolved(claim.clone())
    }
}

impl BingoStore for MemoryBingoStore {
    fn seed_names(&self, names: Vec<String>) -> BoxFuture<'static, StorageResult<usize>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.tables.write().await;
            let mut inserted = 0;
            for name in names {
                if !tables.names.contains_key(&name) {
                    tables
                        .names
                        .insert(name.clone(), NameEntity::unpicked(name));
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    fn list_names(&self) -> BoxFuture<'static, StorageResult<Vec<NameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.tables.read().await;
            Ok(tables.names.values().cloned().collect())
        })
    }

    fn mark_name_picked(
        &self,
        name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<NameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.mark_name_picked(&name, at).await) })
    }

    fn insert_tickets(&self, tickets: Vec<TicketEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.tables.write().await;
            tables
                .tickets
                .extend(tickets.into_iter().map(|ticket| (ticket.id, ticket)));
            Ok(())
        })
    }

    fn count_tickets(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.tables.read().await.tickets.len() as u64) })
    }

    fn assign_free_ticket(
        &self,
        player_name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.assign_free_ticket(player_name, at).await) })
    }

    fn find_ticket(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.tables.read().await.tickets.get(&id).cloned()) })
    }

    fn list_winners(&self) -> BoxFuture<'static, StorageResult<Vec<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.tables.read().await;
            Ok(tables
                .tickets
                .values()
                .filter(|ticket| ticket.status == TicketStatus::Winner)
                .cloned()
                .collect())
        })
    }

    fn transition_ticket(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.tables.write().await;
            let Some(ticket) = tables.tickets.get_mut(&id) else {
                return Ok(false);
            };
            if ticket.status != from {
                return Ok(false);
            }
            ticket.status = to;
            if to == TicketStatus::Claimed {
                ticket.claimed_at = Some(at);
            }
            Ok(true)
        })
    }

    fn try_lock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let Ok(mut holder) = inner.claim_lock.try_lock() else {
                return Ok(false);
            };
            if holder.is_some() {
                return Ok(false);
            }
            *holder = Some(owner);
            Ok(true)
        })
    }

    fn unlock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut holder = inner.claim_lock.lock().await;
            if *holder == Some(owner) {
                holder.take();
            }
            Ok(())
        })
    }

    fn release_stale_locks(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.claim_lock.lock().await.take();
            Ok(())
        })
    }

    fn insert_claim(&self, claim: NewClaim) -> BoxFuture<'static, StorageResult<ClaimEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.tables.write().await;
            tables.last_claim_id += 1;
            let entity = ClaimEntity::pending(tables.last_claim_id, claim);
            tables.claims.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn find_claim(&self, id: u64) -> BoxFuture<'static, StorageResult<Option<ClaimEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.tables.read().await.claims.get(&id).cloned()) })
    }

    fn resolve_claim(
        &self,
        id: u64,
        to: ClaimStatus,
        verifier: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ClaimResolution>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.resolve_claim(id, to, verifier, at).await) })
    }

    fn list_pending_claims(&self) -> BoxFuture<'static, StorageResult<Vec<ClaimEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.tables.read().await;
            let mut pending = tables
                .claims
                .values()
                .filter(|claim| claim.status == ClaimStatus::Pending)
                .cloned()
                .collect::<Vec<_>>();
            pending.sort_by_key(|claim| (claim.claimed_at, claim.id));
            Ok(pending)
        })
    }

    fn count_pending_claims(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let tables = inner.tables.read().await;
            Ok(tables
                .claims
                .values()
                .filter(|claim| claim.status == ClaimStatus::Pending)
                .count() as u64)
        })
    }

    fn read_state(&self, key: &'static str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.tables.read().await.game_state.get(key).cloned()) })
    }

    fn write_state(
        &self,
        key: &'static str,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .tables
                .write()
                .await
                .game_state
                .insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn reset_game(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tables = inner.tables.write().await;
            tables.claims.clear();
            for name in tables.names.values_mut() {
                name.picked = false;
                name.picked_at = None;
                name.pick_order = None;
            }
            for ticket in tables.tickets.values_mut() {
                ticket.reset();
            }
            Ok(())
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::grid::{COLUMNS, Cells, ROWS, TicketGrid};

    fn grid(prefix: &str) -> TicketGrid {
        let mut cells: Cells = Default::default();
        let mut placed = 0;
        'outer: for column in 0..COLUMNS {
            for row in 0..ROWS {
                if placed == 15 {
                    break 'outer;
                }
                if (row + column) % 3 != 0 {
                    cells[row][column] = Some(format!("{prefix}-{placed}"));
                    placed += 1;
                }
            }
        }
        TicketGrid::new(cells).unwrap()
    }

    #[tokio::test]
    async fn row_lock_is_not_waited_on() {
        let store = MemoryBingoStore::new();
        let ticket = TicketEntity::provisioned(grid("a"), SystemTime::now());
        let id = ticket.id;
        store.insert_tickets(vec![ticket]).await.unwrap();

        let held = RowLock::try_acquire(&store.inner.row_locks, id).unwrap();
        let denied = store
            .assign_free_ticket("Bob".into(), SystemTime::now())
            .await
            .unwrap();
        assert!(denied.is_none());

        drop(held);
        let granted = store
            .assign_free_ticket("Bob".into(), SystemTime::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(granted.player_name.as_deref(), Some("Bob"));
        assert!(store.inner.row_locks.is_empty());
    }

    #[tokio::test]
    async fn pick_order_is_strictly_increasing() {
        let store = MemoryBingoStore::new();
        store
            .seed_names(vec!["Ada".into(), "Bea".into(), "Cy".into()])
            .await
            .unwrap();

        let first = store
            .mark_name_picked("Bea".into(), SystemTime::now())
            .await
            .unwrap()
            .unwrap();
        let second = store
            .mark_name_picked("Ada".into(), SystemTime::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.pick_order, Some(1));
        assert_eq!(second.pick_order, Some(2));

        let again = store
            .mark_name_picked("Ada".into(), SystemTime::now())
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn claim_lock_is_exclusive_and_owner_checked() {
        let store = MemoryBingoStore::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.try_lock_claims(first).await.unwrap());
        assert!(!store.try_lock_claims(second).await.unwrap());

        store.unlock_claims(second).await.unwrap();
        assert!(!store.try_lock_claims(second).await.unwrap());

        store.unlock_claims(first).await.unwrap();
        assert!(store.try_lock_claims(second).await.unwrap());
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryBingoStore::new();
        assert_eq!(
            store
                .seed_names(vec!["Ada".into(), "Bea".into()])
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .seed_names(vec!["Bea".into(), "Cy".into()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.list_names().await.unwrap().len(), 3);
    }
}
