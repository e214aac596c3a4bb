pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dao::{
        models::{ClaimEntity, ClaimResolution, NameEntity, NewClaim, TicketEntity},
        storage::StorageResult,
    },
    state::state_machine::{ClaimStatus, TicketStatus},
};

/// Abstraction over the persistence layer holding names, tickets, claims and game state.
///
/// Every method is one atomic unit of work against the backend. Implementations
/// never block on contended locks: the ticket row claim and the claim lock are
/// both try-acquire operations that report contention through their return value.
pub trait BingoStore: Send + Sync {
    /// Insert the names not yet present in the pool, returning how many were added.
    fn seed_names(&self, names: Vec<String>) -> BoxFuture<'static, StorageResult<usize>>;
    fn list_names(&self) -> BoxFuture<'static, StorageResult<Vec<NameEntity>>>;
    /// Mark `name` as picked and give it the next pick order.
    ///
    /// Returns `None` when the name is unknown or was already picked.
    fn mark_name_picked(
        &self,
        name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<NameEntity>>>;

    fn insert_tickets(&self, tickets: Vec<TicketEntity>) -> BoxFuture<'static, StorageResult<()>>;
    fn count_tickets(&self) -> BoxFuture<'static, StorageResult<u64>>;
    /// Grant the first unassigned ticket to `player_name` without waiting on row locks.
    ///
    /// Returns `None` when no ticket is free or the candidate row is held by a
    /// concurrent registration.
    fn assign_free_ticket(
        &self,
        player_name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>>;
    fn find_ticket(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>>;
    fn list_winners(&self) -> BoxFuture<'static, StorageResult<Vec<TicketEntity>>>;
    /// Move ticket `id` from `from` to `to`, returning `false` if it was not in `from`.
    ///
    /// Entering [`TicketStatus::Claimed`] stamps `claimed_at` with `at`.
    fn transition_ticket(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Try to take the global claim lock for `owner`. Never waits.
    fn try_lock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Release the claim lock if `owner` still holds it.
    fn unlock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop claim locks left behind by a crashed process.
    fn release_stale_locks(&self) -> BoxFuture<'static, StorageResult<()>>;

    fn insert_claim(&self, claim: NewClaim) -> BoxFuture<'static, StorageResult<ClaimEntity>>;
    fn find_claim(&self, id: u64) -> BoxFuture<'static, StorageResult<Option<ClaimEntity>>>;
    /// Resolve claim `id` only if it is still pending.
    fn resolve_claim(
        &self,
        id: u64,
        to: ClaimStatus,
        verifier: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ClaimResolution>>;
    /// Pending claims ordered by submission time.
    fn list_pending_claims(&self) -> BoxFuture<'static, StorageResult<Vec<ClaimEntity>>>;
    fn count_pending_claims(&self) -> BoxFuture<'static, StorageResult<u64>>;

    fn read_state(&self, key: &'static str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn write_state(
        &self,
        key: &'static str,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Delete claims, unpick every name and return tickets to active/unassigned.
    fn reset_game(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Short backend label reported by the health endpoint.
    fn backend(&self) -> &'static str;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
