//! Ticket assignment and the claim pipeline.
//!
//! Two locks are involved and must not be confused. The hard claim lock held by
//! the store lets exactly one claim mutate state at a time. The `claim_lock`
//! game-state flag only tells players that a claim awaits review.

use std::{collections::HashSet, sync::Arc, time::SystemTime};

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        bingo_store::BingoStore,
        models::{CLAIM_LOCK_KEY, ClaimEntity, ClaimResolution, NewClaim, TicketEntity},
    },
    error::ServiceError,
    services::{game_service::names_in_pick_order, sse_events},
    state::{
        AppState, SharedState,
        state_machine::{AlreadyResolved, TicketEvent, TicketStatus},
    },
};

/// Identity stamped on claims resolved through the operator API.
pub const VERIFIER: &str = "admin";

/// Rewrites of the claim lock flag before giving up on a moving queue.
const FLAG_SYNC_ATTEMPTS: usize = 4;

/// Result of a claim submission. Contention and bad tickets are expected outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim entered the queue.
    Queued(Box<QueuedClaim>),
    /// Another claim currently holds the claim lock.
    ClaimInProgress,
    /// The ticket does not exist or is not active.
    InvalidTicket,
}

/// A claim accepted into the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedClaim {
    pub claim: ClaimEntity,
    /// Ticket as it stands after entering `claimed`.
    pub ticket: TicketEntity,
    /// Names drawn when the claim was filed, in pick order.
    pub picked_names: Vec<String>,
    /// Pending claims counted right after insertion, unknown if the count failed.
    pub queue_position: Option<u64>,
}

/// A resolved claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub claim: ClaimEntity,
    pub winner: bool,
    pub player_name: Option<String>,
    /// Pending claims left once this one was resolved, unknown if the count failed.
    pub pending_left: Option<u64>,
}

/// A pending claim joined with its ticket for operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub claim: ClaimEntity,
    pub ticket: TicketEntity,
    pub picked_names: Vec<String>,
}

/// Grant the first free ticket to `player_name`.
///
/// Never waits for a concurrent registration: a free row held by someone else
/// is reported as [`ServiceError::GameFull`].
pub async fn register(
    state: &SharedState,
    player_name: &str,
) -> Result<TicketEntity, ServiceError> {
    let player_name = player_name.trim();
    if player_name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be blank".into(),
        ));
    }

    let store = state.require_store().await?;
    let assigned = state
        .bounded_call(store.assign_free_ticket(player_name.to_owned(), SystemTime::now()))
        .await?;

    match assigned {
        Some(ticket) => {
            info!(ticket_id = %ticket.id, player = player_name, "ticket assigned");
            Ok(ticket)
        }
        None => {
            warn!(player = player_name, "registration refused: no free ticket");
            Err(ServiceError::GameFull)
        }
    }
}

/// Submit a claim for `ticket_id`.
///
/// The critical section runs on its own task, so the claim lock is released
/// even if the caller stops waiting for the result.
pub async fn claim(state: &SharedState, ticket_id: Uuid) -> Result<ClaimOutcome, ServiceError> {
    let store = state.require_store().await?;
    let task_state = state.clone();
    let outcome = tokio::spawn(async move {
        claim_exclusively(&task_state, store, Uuid::new_v4(), ticket_id).await
    })
    .await
    .map_err(|err| ServiceError::Internal(format!("claim task failed: {err}")))??;

    match &outcome {
        ClaimOutcome::Queued(queued) => {
            info!(
                claim_id = queued.claim.id,
                %ticket_id,
                valid = queued.claim.is_valid,
                queue_position = ?queued.queue_position,
                "claim queued"
            );
            sse_events::broadcast_claim_submitted(state, queued);
        }
        ClaimOutcome::ClaimInProgress => debug!(%ticket_id, "claim refused: lock busy"),
        ClaimOutcome::InvalidTicket => debug!(%ticket_id, "claim refused: ticket not active"),
    }
    Ok(outcome)
}

async fn claim_exclusively(
    state: &AppState,
    store: Arc<dyn BingoStore>,
    owner: Uuid,
    ticket_id: Uuid,
) -> Result<ClaimOutcome, ServiceError> {
    match state.bounded_call(store.try_lock_claims(owner)).await {
        Ok(true) => {}
        Ok(false) => return Ok(ClaimOutcome::ClaimInProgress),
        Err(err) => {
            // The acquisition may have landed before the failure surfaced.
            release_claim_lock(state, store.as_ref(), owner).await;
            return Err(err);
        }
    }

    let outcome = enqueue_claim(state, store.as_ref(), ticket_id).await;
    release_claim_lock(state, store.as_ref(), owner).await;
    outcome
}

async fn release_claim_lock(state: &AppState, store: &dyn BingoStore, owner: Uuid) {
    if let Err(err) = state.bounded_call(store.unlock_claims(owner)).await {
        error!(%owner, error = %err, "failed to release claim lock");
    }
}

/// Body of the claim critical section. Must only run while the claim lock is held.
///
/// Once the ticket has left `active`, every failure path either finds the
/// queue entry that was written or puts the ticket back in play.
async fn enqueue_claim(
    state: &AppState,
    store: &dyn BingoStore,
    ticket_id: Uuid,
) -> Result<ClaimOutcome, ServiceError> {
    let Some(mut ticket) = state.bounded_call(store.find_ticket(ticket_id)).await? else {
        return Ok(ClaimOutcome::InvalidTicket);
    };
    let from = ticket.status;
    let Ok(to) = from.apply(TicketEvent::ClaimSubmitted) else {
        return Ok(ClaimOutcome::InvalidTicket);
    };

    let picked_names = names_in_pick_order(state.bounded_call(store.list_names()).await?)
        .into_iter()
        .map(|entry| entry.name)
        .collect::<Vec<_>>();
    let picked = picked_names
        .iter()
        .map(String::as_str)
        .collect::<HashSet<_>>();
    let is_valid = ticket.grid.is_covered_by(&picked);

    let now = SystemTime::now();
    match state
        .bounded_call(store.transition_ticket(ticket_id, from, to, now))
        .await
    {
        Ok(true) => {}
        Ok(false) => return Ok(ClaimOutcome::InvalidTicket),
        Err(err) => {
            // The transition may have landed before the failure surfaced.
            return_ticket_to_play(state, store, ticket_id, to, from).await;
            return Err(err);
        }
    }

    let inserted = state
        .bounded_call(store.insert_claim(NewClaim {
            ticket_id,
            claimed_at: now,
            is_valid,
        }))
        .await;
    let claim = match inserted {
        Ok(claim) => claim,
        Err(err) => match find_pending_claim(state, store, ticket_id).await {
            Some(claim) => {
                warn!(
                    claim_id = claim.id,
                    %ticket_id,
                    error = %err,
                    "claim insert reported a failure but the entry was written"
                );
                claim
            }
            None => {
                return_ticket_to_play(state, store, ticket_id, to, from).await;
                return Err(err);
            }
        },
    };

    let queue_position = match sync_claim_flag(state, store).await {
        Ok(pending) => Some(pending),
        Err(err) => {
            warn!(claim_id = claim.id, error = %err, "failed to raise claim lock flag");
            None
        }
    };

    ticket.status = to;
    ticket.claimed_at = Some(now);
    Ok(ClaimOutcome::Queued(Box::new(QueuedClaim {
        claim,
        ticket,
        picked_names,
        queue_position,
    })))
}

/// The pending entry for `ticket_id`, if any. A ticket that was `active` has no
/// other pending claim, so a match is the entry this claim attempt wrote.
async fn find_pending_claim(
    state: &AppState,
    store: &dyn BingoStore,
    ticket_id: Uuid,
) -> Option<ClaimEntity> {
    match state.bounded_call(store.list_pending_claims()).await {
        Ok(pending) => pending.into_iter().find(|claim| claim.ticket_id == ticket_id),
        Err(err) => {
            error!(%ticket_id, error = %err, "cannot tell whether the claim entry was written");
            None
        }
    }
}

async fn return_ticket_to_play(
    state: &AppState,
    store: &dyn BingoStore,
    ticket_id: Uuid,
    from: TicketStatus,
    to: TicketStatus,
) {
    match state
        .bounded_call(store.transition_ticket(ticket_id, from, to, SystemTime::now()))
        .await
    {
        Ok(true) => debug!(%ticket_id, "ticket returned to play after failed claim"),
        Ok(false) => {}
        Err(err) => {
            error!(%ticket_id, error = %err, "failed to return ticket to play after failed claim")
        }
    }
}

/// Write the `claim_lock` flag from the pending count and return that count.
///
/// Each write is checked against a fresh count and rewritten if the queue moved
/// in between. Every claim and verdict ends here, so the last write always
/// matches the queue even when claims and verdicts interleave.
pub async fn sync_claim_flag(state: &AppState, store: &dyn BingoStore) -> Result<u64, ServiceError> {
    let mut pending = state.bounded_call(store.count_pending_claims()).await?;
    for _ in 0..FLAG_SYNC_ATTEMPTS {
        state
            .bounded_call(store.write_state(CLAIM_LOCK_KEY, Value::Bool(pending > 0)))
            .await?;
        let recount = state.bounded_call(store.count_pending_claims()).await?;
        if (recount > 0) == (pending > 0) {
            return Ok(recount);
        }
        pending = recount;
    }
    warn!(pending, "claim queue kept moving while the lock flag was written");
    Ok(pending)
}

/// Resolve a pending claim with the operator verdict.
///
/// Approval makes the ticket a winner; rejection returns it to play. A claim
/// that is already resolved is refused with [`ServiceError::AlreadyVerified`];
/// if an earlier resolution was cut short before its ticket moved, the refusal
/// finishes that work first.
pub async fn verify_claim(
    state: &SharedState,
    claim_id: u64,
    approve: bool,
) -> Result<Verification, ServiceError> {
    let store = state.require_store().await?;
    let task_state = state.clone();
    let verification = tokio::spawn(async move {
        resolve_claim(&task_state, store.as_ref(), claim_id, approve).await
    })
    .await
    .map_err(|err| ServiceError::Internal(format!("verify task failed: {err}")))??;

    info!(
        claim_id,
        ticket_id = %verification.claim.ticket_id,
        winner = verification.winner,
        pending_left = ?verification.pending_left,
        "claim resolved"
    );
    sse_events::broadcast_claim_verified(state, &verification);
    Ok(verification)
}

async fn resolve_claim(
    state: &AppState,
    store: &dyn BingoStore,
    claim_id: u64,
    approve: bool,
) -> Result<Verification, ServiceError> {
    let claim = state
        .bounded_call(store.find_claim(claim_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("claim `{claim_id}` not found")))?;
    let target = match claim.status.resolve(approve) {
        Ok(target) => target,
        Err(resolved) => {
            if let Err(err) = settle_resolved_claim(state, store, &claim).await {
                warn!(claim_id, error = %err, "failed to settle resolved claim");
            }
            return Err(ServiceError::already_verified(claim_id, resolved));
        }
    };

    let resolution = state
        .bounded_call(store.resolve_claim(
            claim_id,
            target,
            VERIFIER.to_owned(),
            SystemTime::now(),
        ))
        .await?;
    let claim = match resolution {
        ClaimResolution::Resolved(claim) => claim,
        ClaimResolution::AlreadyResolved(status) => {
            return Err(ServiceError::already_verified(
                claim_id,
                AlreadyResolved(status),
            ));
        }
        ClaimResolution::Missing => {
            return Err(ServiceError::NotFound(format!(
                "claim `{claim_id}` not found"
            )));
        }
    };

    move_claimed_ticket(state, store, &claim).await?;

    let pending_left = match sync_claim_flag(state, store).await {
        Ok(pending) => Some(pending),
        Err(err) => {
            warn!(claim_id, error = %err, "failed to update claim lock flag");
            None
        }
    };
    let player_name = match state.bounded_call(store.find_ticket(claim.ticket_id)).await {
        Ok(ticket) => ticket.and_then(|ticket| ticket.player_name),
        Err(err) => {
            warn!(claim_id, error = %err, "failed to load claimant");
            None
        }
    };

    Ok(Verification {
        winner: approve,
        claim,
        player_name,
        pending_left,
    })
}

/// Apply the verdict of a resolved `claim` to its ticket, still in `claimed`.
async fn move_claimed_ticket(
    state: &AppState,
    store: &dyn BingoStore,
    claim: &ClaimEntity,
) -> Result<(), ServiceError> {
    let event = claim
        .status
        .ticket_event()
        .ok_or_else(|| ServiceError::InvalidState("claim left pending".into()))?;
    let to = TicketStatus::Claimed.apply(event)?;
    let moved = state
        .bounded_call(store.transition_ticket(
            claim.ticket_id,
            TicketStatus::Claimed,
            to,
            SystemTime::now(),
        ))
        .await?;
    if !moved {
        warn!(
            claim_id = claim.id,
            ticket_id = %claim.ticket_id,
            "ticket was no longer claimed; status left unchanged"
        );
    }
    Ok(())
}

/// Finish a resolution whose ticket update never happened.
///
/// The ticket only moves while it is still `claimed` by this very claim: the
/// claim and the ticket share the submission timestamp, and a ticket claimed
/// again later carries a newer one.
async fn settle_resolved_claim(
    state: &AppState,
    store: &dyn BingoStore,
    claim: &ClaimEntity,
) -> Result<(), ServiceError> {
    let ticket = state.bounded_call(store.find_ticket(claim.ticket_id)).await?;
    let stranded = ticket.is_some_and(|ticket| {
        ticket.status == TicketStatus::Claimed && ticket.claimed_at == Some(claim.claimed_at)
    });
    if stranded {
        info!(claim_id = claim.id, ticket_id = %claim.ticket_id, "settling ticket of resolved claim");
        move_claimed_ticket(state, store, claim).await?;
    }
    sync_claim_flag(state, store).await?;
    Ok(())
}

/// Pending claims in submission order, with each ticket and the names drawn so far.
pub async fn list_pending_claims(state: &SharedState) -> Result<Vec<PendingClaim>, ServiceError> {
    let store = state.require_store().await?;
    state.bounded(collect_pending(store.as_ref())).await
}

async fn collect_pending(store: &dyn BingoStore) -> Result<Vec<PendingClaim>, ServiceError> {
    let claims = store.list_pending_claims().await?;
    let picked_names = names_in_pick_order(store.list_names().await?)
        .into_iter()
        .map(|entry| entry.name)
        .collect::<Vec<_>>();

    let mut pending = Vec::with_capacity(claims.len());
    for claim in claims {
        match store.find_ticket(claim.ticket_id).await? {
            Some(ticket) => pending.push(PendingClaim {
                claim,
                ticket,
                picked_names: picked_names.clone(),
            }),
            None => warn!(
                claim_id = claim.id,
                ticket_id = %claim.ticket_id,
                "pending claim references a missing ticket"
            ),
        }
    }
    Ok(pending)
}

/// Clear claims, picks and assignments while keeping every ticket grid.
pub async fn reset_game(state: &SharedState) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    state.bounded(reset_store(store.as_ref())).await?;
    info!("game reset");
    sse_events::broadcast_game_reset(state);
    Ok(())
}

async fn reset_store(store: &dyn BingoStore) -> Result<(), ServiceError> {
    store.reset_game().await?;
    store
        .write_state(CLAIM_LOCK_KEY, Value::Bool(false))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use futures::future::BoxFuture;
    use rand::{SeedableRng, rngs::StdRng};
    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{bingo_store::memory::MemoryBingoStore, models::NameEntity, storage::StorageResult},
        services::ticket_generator::pre_generate_tickets,
        state::state_machine::ClaimStatus,
    };

    async fn seeded_store(count: usize) -> (MemoryBingoStore, AppConfig) {
        let names = (0..30).map(|i| format!("name-{i:02}")).collect::<Vec<_>>();
        let store = MemoryBingoStore::new();
        store.seed_names(names.clone()).await.unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let tickets = pre_generate_tickets(&names, count, &mut rng)
            .unwrap()
            .into_iter()
            .map(|grid| TicketEntity::provisioned(grid, SystemTime::now()))
            .collect();
        store.insert_tickets(tickets).await.unwrap();

        (store, AppConfig::new(names, Some(count)))
    }

    async fn state_with_tickets(count: usize) -> (SharedState, Arc<dyn BingoStore>) {
        let (store, config) = seeded_store(count).await;
        let store: Arc<dyn BingoStore> = Arc::new(store);
        (AppState::with_store(config, store.clone()), store)
    }

    /// Where a stalled call sleeps relative to the store work it wraps.
    #[derive(Debug, Clone, Copy)]
    enum Stall {
        /// Nothing reaches the store if the caller gives up during the stall.
        Before,
        /// The write lands but the reply comes late.
        After,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        InsertClaim,
        TransitionFrom(TicketStatus),
        WriteState,
    }

    /// Memory store that delays the next call matching the armed [`Call`].
    struct StallingStore {
        inner: MemoryBingoStore,
        armed: Mutex<Option<(Call, Stall, Duration)>>,
    }

    impl StallingStore {
        fn arm(&self, call: Call, stall: Stall, delay: Duration) {
            *self.armed.lock().unwrap() = Some((call, stall, delay));
        }

        fn wrap<T: Send + 'static>(
            &self,
            call: Call,
            work: BoxFuture<'static, StorageResult<T>>,
        ) -> BoxFuture<'static, StorageResult<T>> {
            let stall = {
                let mut armed = self.armed.lock().unwrap();
                match *armed {
                    Some((target, _, _)) if target == call => armed.take(),
                    _ => None,
                }
            };
            match stall {
                None => work,
                Some((_, Stall::Before, delay)) => Box::pin(async move {
                    sleep(delay).await;
                    work.await
                }),
                Some((_, Stall::After, delay)) => Box::pin(async move {
                    let result = work.await;
                    sleep(delay).await;
                    result
                }),
            }
        }
    }

    impl BingoStore for StallingStore {
        fn seed_names(&self, names: Vec<String>) -> BoxFuture<'static, StorageResult<usize>> {
            self.inner.seed_names(names)
        }

        fn list_names(&self) -> BoxFuture<'static, StorageResult<Vec<NameEntity>>> {
            self.inner.list_names()
        }

        fn mark_name_picked(
            &self,
            name: String,
            at: SystemTime,
        ) -> BoxFuture<'static, StorageResult<Option<NameEntity>>> {
            self.inner.mark_name_picked(name, at)
        }

        fn insert_tickets(&self, tickets: Vec<TicketEntity>) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_tickets(tickets)
        }

        fn count_tickets(&self) -> BoxFuture<'static, StorageResult<u64>> {
            self.inner.count_tickets()
        }

        fn assign_free_ticket(
            &self,
            player_name: String,
            at: SystemTime,
        ) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
            self.inner.assign_free_ticket(player_name, at)
        }

        fn find_ticket(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
            self.inner.find_ticket(id)
        }

        fn list_winners(&self) -> BoxFuture<'static, StorageResult<Vec<TicketEntity>>> {
            self.inner.list_winners()
        }

        fn transition_ticket(
            &self,
            id: Uuid,
            from: TicketStatus,
            to: TicketStatus,
            at: SystemTime,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.wrap(
                Call::TransitionFrom(from),
                self.inner.transition_ticket(id, from, to, at),
            )
        }

        fn try_lock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.try_lock_claims(owner)
        }

        fn unlock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.unlock_claims(owner)
        }

        fn release_stale_locks(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.release_stale_locks()
        }

        fn insert_claim(&self, claim: NewClaim) -> BoxFuture<'static, StorageResult<ClaimEntity>> {
            self.wrap(Call::InsertClaim, self.inner.insert_claim(claim))
        }

        fn find_claim(&self, id: u64) -> BoxFuture<'static, StorageResult<Option<ClaimEntity>>> {
            self.inner.find_claim(id)
        }

        fn resolve_claim(
            &self,
            id: u64,
            to: ClaimStatus,
            verifier: String,
            at: SystemTime,
        ) -> BoxFuture<'static, StorageResult<ClaimResolution>> {
            self.inner.resolve_claim(id, to, verifier, at)
        }

        fn list_pending_claims(&self) -> BoxFuture<'static, StorageResult<Vec<ClaimEntity>>> {
            self.inner.list_pending_claims()
        }

        fn count_pending_claims(&self) -> BoxFuture<'static, StorageResult<u64>> {
            self.inner.count_pending_claims()
        }

        fn read_state(&self, key: &'static str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            self.inner.read_state(key)
        }

        fn write_state(
            &self,
            key: &'static str,
            value: Value,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.wrap(Call::WriteState, self.inner.write_state(key, value))
        }

        fn reset_game(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.reset_game()
        }

        fn backend(&self) -> &'static str {
            "stalling"
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    const STEP_LIMIT: Duration = Duration::from_millis(100);
    const STALL: Duration = Duration::from_millis(400);

    async fn stalling_state(count: usize, step_limit: Duration) -> (SharedState, Arc<StallingStore>) {
        let (inner, config) = seeded_store(count).await;
        let store = Arc::new(StallingStore {
            inner,
            armed: Mutex::new(None),
        });
        let state = AppState::with_store_and_timeout(config, store.clone(), step_limit);
        (state, store)
    }

    async fn queued(state: &SharedState, ticket_id: Uuid) -> QueuedClaim {
        match claim(state, ticket_id).await.unwrap() {
            ClaimOutcome::Queued(queued) => *queued,
            other => panic!("expected a queued claim, got {other:?}"),
        }
    }

    async fn lock_flag(store: &Arc<dyn BingoStore>) -> Option<Value> {
        store.read_state(CLAIM_LOCK_KEY).await.unwrap()
    }

    #[tokio::test]
    async fn blank_player_name_is_rejected() {
        let (state, _) = state_with_tickets(1).await;
        let err = register(&state, "  ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn registration_stops_when_tickets_run_out() {
        let (state, _) = state_with_tickets(2).await;
        let first = register(&state, "Alice").await.unwrap();
        let second = register(&state, " Bob ").await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.player_name.as_deref(), Some("Bob"));
        assert!(matches!(
            register(&state, "Carol").await,
            Err(ServiceError::GameFull)
        ));
    }

    #[tokio::test]
    async fn claim_on_unknown_ticket_is_invalid_and_releases_lock() {
        let (state, store) = state_with_tickets(1).await;
        let outcome = claim(&state, Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::InvalidTicket);
        assert!(store.try_lock_claims(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn claim_is_queued_with_validity_and_raises_flag() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();

        let queued = queued(&state, ticket.id).await;
        assert_eq!(queued.queue_position, Some(1));
        assert!(!queued.claim.is_valid);
        assert_eq!(queued.claim.status, ClaimStatus::Pending);
        assert_eq!(queued.ticket.status, TicketStatus::Claimed);
        assert_eq!(lock_flag(&store).await, Some(Value::Bool(true)));

        assert_eq!(
            claim(&state, ticket.id).await.unwrap(),
            ClaimOutcome::InvalidTicket
        );
    }

    #[tokio::test]
    async fn fully_covered_ticket_is_marked_valid() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        for name in ticket.grid.names() {
            store
                .mark_name_picked(name.to_owned(), SystemTime::now())
                .await
                .unwrap()
                .unwrap();
        }

        let queued = queued(&state, ticket.id).await;
        assert!(queued.claim.is_valid);
        assert_eq!(queued.picked_names.len(), 15);
    }

    #[tokio::test]
    async fn claim_under_contention_writes_nothing() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        let holder = Uuid::new_v4();
        assert!(store.try_lock_claims(holder).await.unwrap());

        assert_eq!(
            claim(&state, ticket.id).await.unwrap(),
            ClaimOutcome::ClaimInProgress
        );
        assert_eq!(store.count_pending_claims().await.unwrap(), 0);
        let unchanged = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TicketStatus::Active);
        assert_eq!(lock_flag(&store).await, None);

        store.unlock_claims(holder).await.unwrap();
        assert!(matches!(
            claim(&state, ticket.id).await.unwrap(),
            ClaimOutcome::Queued(_)
        ));
    }

    #[tokio::test]
    async fn approval_makes_a_winner_and_clears_flag() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        let queued = queued(&state, ticket.id).await;

        let verification = verify_claim(&state, queued.claim.id, true).await.unwrap();
        assert!(verification.winner);
        assert_eq!(verification.pending_left, Some(0));
        assert_eq!(verification.player_name.as_deref(), Some("Alice"));
        assert_eq!(verification.claim.status, ClaimStatus::Verified);
        assert_eq!(verification.claim.verified_by.as_deref(), Some(VERIFIER));

        let winner = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(winner.status, TicketStatus::Winner);
        assert_eq!(lock_flag(&store).await, Some(Value::Bool(false)));
    }

    #[tokio::test]
    async fn rejection_returns_ticket_to_play() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        let queued = queued(&state, ticket.id).await;

        let verification = verify_claim(&state, queued.claim.id, false).await.unwrap();
        assert!(!verification.winner);
        assert_eq!(verification.claim.status, ClaimStatus::Rejected);

        let back = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(back.status, TicketStatus::Active);
        let again = self::queued(&state, ticket.id).await;
        assert_eq!(again.queue_position, Some(1));
    }

    #[tokio::test]
    async fn flag_stays_up_while_claims_are_pending() {
        let (state, store) = state_with_tickets(2).await;
        let alice = register(&state, "Alice").await.unwrap();
        let bob = register(&state, "Bob").await.unwrap();
        let first = queued(&state, alice.id).await;
        let second = queued(&state, bob.id).await;
        assert_eq!(second.queue_position, Some(2));

        verify_claim(&state, first.claim.id, false).await.unwrap();
        assert_eq!(lock_flag(&store).await, Some(Value::Bool(true)));

        verify_claim(&state, second.claim.id, true).await.unwrap();
        assert_eq!(lock_flag(&store).await, Some(Value::Bool(false)));
    }

    #[tokio::test]
    async fn resolved_claim_cannot_be_verified_twice() {
        let (state, _) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        let queued = queued(&state, ticket.id).await;
        verify_claim(&state, queued.claim.id, true).await.unwrap();

        let err = verify_claim(&state, queued.claim.id, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::AlreadyVerified { id, ref status } if id == queued.claim.id && status == "verified"
        ));
    }

    #[tokio::test]
    async fn unknown_claim_is_not_found() {
        let (state, _) = state_with_tickets(1).await;
        assert!(matches!(
            verify_claim(&state, 404, true).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_claims_carry_ticket_details() {
        let (state, _) = state_with_tickets(2).await;
        let alice = register(&state, "Alice").await.unwrap();
        let bob = register(&state, "Bob").await.unwrap();
        queued(&state, alice.id).await;
        queued(&state, bob.id).await;

        let pending = list_pending_claims(&state).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].ticket.id, alice.id);
        assert_eq!(pending[0].ticket.player_name.as_deref(), Some("Alice"));
        assert_eq!(pending[1].ticket.grid, bob.grid);
    }

    #[tokio::test]
    async fn reset_clears_claims_and_assignments() {
        let (state, store) = state_with_tickets(1).await;
        let ticket = register(&state, "Alice").await.unwrap();
        queued(&state, ticket.id).await;

        reset_game(&state).await.unwrap();

        assert!(list_pending_claims(&state).await.unwrap().is_empty());
        assert_eq!(lock_flag(&store).await, Some(Value::Bool(false)));
        let fresh = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert!(!fresh.is_assigned);
        assert_eq!(fresh.player_name, None);
        assert_eq!(fresh.status, TicketStatus::Active);
        assert_eq!(fresh.grid, ticket.grid);
        register(&state, "Bob").await.unwrap();
    }

    #[tokio::test]
    async fn operations_fail_fast_without_storage() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            register(&state, "Alice").await,
            Err(ServiceError::Degraded)
        ));
        assert!(matches!(
            claim(&state, Uuid::new_v4()).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn claim_insert_timeout_returns_ticket_to_play() {
        let (state, store) = stalling_state(1, STEP_LIMIT).await;
        let ticket = register(&state, "Alice").await.unwrap();

        store.arm(Call::InsertClaim, Stall::Before, STALL);
        assert!(matches!(
            claim(&state, ticket.id).await,
            Err(ServiceError::Timeout)
        ));

        let back = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(back.status, TicketStatus::Active);
        assert_eq!(store.count_pending_claims().await.unwrap(), 0);

        let retried = queued(&state, ticket.id).await;
        assert_eq!(retried.queue_position, Some(1));
    }

    #[tokio::test]
    async fn late_claim_insert_keeps_the_written_entry() {
        let (state, store) = stalling_state(1, STEP_LIMIT).await;
        let ticket = register(&state, "Alice").await.unwrap();

        store.arm(Call::InsertClaim, Stall::After, STALL);
        let queued = queued(&state, ticket.id).await;
        assert_eq!(queued.queue_position, Some(1));

        let claimed = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, TicketStatus::Claimed);
        assert_eq!(store.count_pending_claims().await.unwrap(), 1);
        assert_eq!(
            store.read_state(CLAIM_LOCK_KEY).await.unwrap(),
            Some(Value::Bool(true))
        );
        assert!(store.try_lock_claims(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn interrupted_verdict_is_settled_by_a_retry() {
        let (state, store) = stalling_state(1, STEP_LIMIT).await;
        let ticket = register(&state, "Alice").await.unwrap();
        let first = queued(&state, ticket.id).await;

        store.arm(Call::TransitionFrom(TicketStatus::Claimed), Stall::Before, STALL);
        assert!(matches!(
            verify_claim(&state, first.claim.id, false).await,
            Err(ServiceError::Timeout)
        ));
        let stuck = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, TicketStatus::Claimed);
        let resolved = store.find_claim(first.claim.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, ClaimStatus::Rejected);

        assert!(matches!(
            verify_claim(&state, first.claim.id, false).await,
            Err(ServiceError::AlreadyVerified { .. })
        ));
        let settled = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(settled.status, TicketStatus::Active);
        assert_eq!(
            store.read_state(CLAIM_LOCK_KEY).await.unwrap(),
            Some(Value::Bool(false))
        );

        // Once the ticket is claimed again, the old verdict leaves it alone.
        let second = queued(&state, ticket.id).await;
        assert!(verify_claim(&state, first.claim.id, true).await.is_err());
        let reclaimed = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(reclaimed.status, TicketStatus::Claimed);
        assert_eq!(reclaimed.claimed_at, Some(second.claim.claimed_at));
        assert_eq!(
            store.read_state(CLAIM_LOCK_KEY).await.unwrap(),
            Some(Value::Bool(true))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn verdict_racing_the_flag_write_leaves_flag_matching_queue() {
        let (state, store) = stalling_state(1, Duration::from_secs(5)).await;
        let ticket = register(&state, "Alice").await.unwrap();

        store.arm(Call::WriteState, Stall::Before, STALL);
        let claiming = {
            let state = state.clone();
            let ticket_id = ticket.id;
            tokio::spawn(async move { claim(&state, ticket_id).await })
        };

        let claim_id = loop {
            if let Some(entry) = store.list_pending_claims().await.unwrap().first() {
                break entry.id;
            }
            sleep(Duration::from_millis(5)).await;
        };
        let verification = verify_claim(&state, claim_id, false).await.unwrap();
        assert_eq!(verification.pending_left, Some(0));

        let ClaimOutcome::Queued(queued) = claiming.await.unwrap().unwrap() else {
            panic!("claim should have been queued");
        };
        assert_eq!(queued.queue_position, Some(0));
        assert_eq!(
            store.read_state(CLAIM_LOCK_KEY).await.unwrap(),
            Some(Value::Bool(false))
        );
    }
}
