use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use serde_json::Value;
use tokio::{sync::RwLock, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        CLAIM_COLLECTION_NAME, COUNTER_COLLECTION_NAME, LOCK_COLLECTION_NAME,
        MongoClaimDocument, MongoCounterDocument, MongoNameDocument, MongoStateDocument,
        MongoTicketDocument, NAME_COLLECTION_NAME, STATE_COLLECTION_NAME, TICKET_COLLECTION_NAME,
    },
};
use crate::{
    dao::{
        bingo_store::BingoStore,
        models::{ClaimEntity, ClaimResolution, NameEntity, NewClaim, TicketEntity},
        storage::StorageResult,
    },
    state::state_machine::{ClaimStatus, TicketStatus},
};

/// First pause between connection pings; doubled after each failure.
const CONNECT_BACKOFF_START: Duration = Duration::from_millis(250);
const CONNECT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Document id of the named lock serialising claim submissions.
const CLAIM_LOCK_ID: &str = "claims";
const CLAIM_ID_COUNTER: &str = "claim_id";
const PICK_ORDER_COUNTER: &str = "pick_order";

/// MongoDB backend. The claim lock is a leased document in the shared
/// database, so it serialises claims across every instance pointed at it.
#[derive(Clone)]
pub struct MongoBingoStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        ping(&self.database().await)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = open_database(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn names(&self) -> Collection<MongoNameDocument> {
        self.database().await.collection(NAME_COLLECTION_NAME)
    }

    async fn tickets(&self) -> Collection<MongoTicketDocument> {
        self.database().await.collection(TICKET_COLLECTION_NAME)
    }

    async fn claims(&self) -> Collection<MongoClaimDocument> {
        self.database().await.collection(CLAIM_COLLECTION_NAME)
    }

    async fn game_state(&self) -> Collection<MongoStateDocument> {
        self.database().await.collection(STATE_COLLECTION_NAME)
    }

    async fn locks(&self) -> Collection<Document> {
        self.database().await.collection(LOCK_COLLECTION_NAME)
    }

    async fn counters(&self) -> Collection<MongoCounterDocument> {
        self.database().await.collection(COUNTER_COLLECTION_NAME)
    }

    /// Atomically increment and return the named counter, creating it on first use.
    async fn next_sequence(&self, name: &'static str) -> MongoResult<i64> {
        let counter = self
            .counters()
            .await
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation("increment counter", COUNTER_COLLECTION_NAME))?;

        counter
            .map(|counter| counter.seq)
            .ok_or_else(|| MongoDaoError::CorruptedDocument {
                collection: COUNTER_COLLECTION_NAME,
                message: format!("counter `{name}` missing after upsert"),
            })
    }

    async fn seed_names(&self, names: Vec<String>) -> MongoResult<usize> {
        let collection = self.names().await;
        let mut inserted = 0;
        for name in names {
            let result = collection
                .update_one(
                    doc! { "_id": name.as_str() },
                    doc! { "$setOnInsert": {
                        "picked": false,
                        "picked_at": Bson::Null,
                        "pick_order": Bson::Null,
                    } },
                )
                .upsert(true)
                .await
                .map_err(MongoDaoError::operation("seed name", NAME_COLLECTION_NAME))?;
            if result.upserted_id.is_some() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_names(&self) -> MongoResult<Vec<NameEntity>> {
        let documents: Vec<MongoNameDocument> = self
            .names()
            .await
            .find(doc! {})
            .await
            .map_err(MongoDaoError::operation("list names", NAME_COLLECTION_NAME))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation("list names", NAME_COLLECTION_NAME))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn mark_name_picked(&self, name: String, at: SystemTime) -> MongoResult<Option<NameEntity>> {
        // Orders may skip a value when a concurrent pick loses the race below;
        // they still never repeat.
        let order = self.next_sequence(PICK_ORDER_COUNTER).await?;
        let picked = self
            .names()
            .await
            .find_one_and_update(
                doc! { "_id": name.as_str(), "picked": false },
                doc! { "$set": {
                    "picked": true,
                    "picked_at": DateTime::from_system_time(at),
                    "pick_order": order,
                } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation("pick name", NAME_COLLECTION_NAME))?;
        Ok(picked.map(Into::into))
    }

    async fn insert_tickets(&self, tickets: Vec<TicketEntity>) -> MongoResult<()> {
        if tickets.is_empty() {
            return Ok(());
        }
        let documents = tickets
            .into_iter()
            .map(MongoTicketDocument::from)
            .collect::<Vec<_>>();
        self.tickets()
            .await
            .insert_many(documents)
            .await
            .map_err(MongoDaoError::operation("insert tickets", TICKET_COLLECTION_NAME))?;
        Ok(())
    }

    async fn count_tickets(&self) -> MongoResult<u64> {
        self.tickets()
            .await
            .count_documents(doc! {})
            .await
            .map_err(MongoDaoError::operation("count tickets", TICKET_COLLECTION_NAME))
    }

    /// A single `findAndModify` on the first unassigned ticket: the document-level
    /// write is atomic, so two registrations can never be granted the same row and
    /// neither waits on the other.
    async fn assign_free_ticket(
        &self,
        player_name: String,
        at: SystemTime,
    ) -> MongoResult<Option<TicketEntity>> {
        let document = self
            .tickets()
            .await
            .find_one_and_update(
                doc! { "is_assigned": false },
                doc! { "$set": {
                    "is_assigned": true,
                    "player_name": player_name,
                    "assigned_at": DateTime::from_system_time(at),
                } },
            )
            .sort(doc! { "created_at": 1, "_id": 1 })
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation("assign ticket", TICKET_COLLECTION_NAME))?;
        document.map(TicketEntity::try_from).transpose()
    }

    async fn find_ticket(&self, id: Uuid) -> MongoResult<Option<TicketEntity>> {
        self.tickets()
            .await
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(MongoDaoError::operation("load ticket", TICKET_COLLECTION_NAME))?
            .map(TicketEntity::try_from)
            .transpose()
    }

    async fn list_winners(&self) -> MongoResult<Vec<TicketEntity>> {
        let documents: Vec<MongoTicketDocument> = self
            .tickets()
            .await
            .find(doc! { "status": TicketStatus::Winner.as_str() })
            .sort(doc! { "claimed_at": 1 })
            .await
            .map_err(MongoDaoError::operation("list winners", TICKET_COLLECTION_NAME))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation("list winners", TICKET_COLLECTION_NAME))?;
        documents.into_iter().map(TicketEntity::try_from).collect()
    }

    async fn transition_ticket(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        at: SystemTime,
    ) -> MongoResult<bool> {
        let mut set = doc! { "status": to.as_str() };
        if to == TicketStatus::Claimed {
            set.insert("claimed_at", DateTime::from_system_time(at));
        }
        let result = self
            .tickets()
            .await
            .update_one(
                doc! { "_id": id.to_string(), "status": from.as_str() },
                doc! { "$set": set },
            )
            .await
            .map_err(MongoDaoError::operation("update ticket status", TICKET_COLLECTION_NAME))?;
        Ok(result.matched_count == 1)
    }

    /// Take the lease if nobody holds it or the previous lease expired. When a
    /// live lease exists the upsert collides on `_id` and we report contention.
    async fn try_lock_claims(&self, owner: Uuid) -> MongoResult<bool> {
        let now = DateTime::now();
        let lease_ms = i64::try_from(self.config.claim_lock_lease.as_millis()).unwrap_or(i64::MAX);
        let expires_at = DateTime::from_millis(now.timestamp_millis().saturating_add(lease_ms));

        let outcome = self
            .locks()
            .await
            .update_one(
                doc! { "_id": CLAIM_LOCK_ID, "expires_at": { "$lt": now } },
                doc! { "$set": { "owner": owner.to_string(), "expires_at": expires_at } },
            )
            .upsert(true)
            .await;

        match outcome {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Operation {
                operation: "acquire claim lock",
                collection: LOCK_COLLECTION_NAME,
                source,
            }),
        }
    }

    async fn unlock_claims(&self, owner: Uuid) -> MongoResult<()> {
        self.locks()
            .await
            .delete_one(doc! { "_id": CLAIM_LOCK_ID, "owner": owner.to_string() })
            .await
            .map_err(MongoDaoError::operation("release claim lock", LOCK_COLLECTION_NAME))?;
        Ok(())
    }

    async fn release_stale_locks(&self) -> MongoResult<()> {
        let result = self
            .locks()
            .await
            .delete_many(doc! { "expires_at": { "$lt": DateTime::now() } })
            .await
            .map_err(MongoDaoError::operation("release stale locks", LOCK_COLLECTION_NAME))?;
        if result.deleted_count > 0 {
            debug!(count = result.deleted_count, "released expired claim locks");
        }
        Ok(())
    }

    async fn insert_claim(&self, claim: NewClaim) -> MongoResult<ClaimEntity> {
        let id = self.next_sequence(CLAIM_ID_COUNTER).await?;
        let entity = ClaimEntity::pending(id as u64, claim);
        self.claims()
            .await
            .insert_one(MongoClaimDocument::from(entity.clone()))
            .await
            .map_err(MongoDaoError::operation("insert claim", CLAIM_COLLECTION_NAME))?;
        Ok(entity)
    }

    async fn find_claim(&self, id: u64) -> MongoResult<Option<ClaimEntity>> {
        self.claims()
            .await
            .find_one(doc! { "_id": id as i64 })
            .await
            .map_err(MongoDaoError::operation("load claim", CLAIM_COLLECTION_NAME))?
            .map(ClaimEntity::try_from)
            .transpose()
    }

    async fn resolve_claim(
        &self,
        id: u64,
        to: ClaimStatus,
        verifier: String,
        at: SystemTime,
    ) -> MongoResult<ClaimResolution> {
        let resolved = self
            .claims()
            .await
            .find_one_and_update(
                doc! { "_id": id as i64, "status": ClaimStatus::Pending.as_str() },
                doc! { "$set": {
                    "status": to.as_str(),
                    "verified_by": verifier,
                    "verified_at": DateTime::from_system_time(at),
                } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation("resolve claim", CLAIM_COLLECTION_NAME))?;

        if let Some(document) = resolved {
            return Ok(ClaimResolution::Resolved(document.try_into()?));
        }

        Ok(match self.find_claim(id).await? {
            Some(existing) => ClaimResolution::AlreadyResolved(existing.status),
            None => ClaimResolution::Missing,
        })
    }

    async fn list_pending_claims(&self) -> MongoResult<Vec<ClaimEntity>> {
        let documents: Vec<MongoClaimDocument> = self
            .claims()
            .await
            .find(doc! { "status": ClaimStatus::Pending.as_str() })
            .sort(doc! { "claimed_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::operation("list claims", CLAIM_COLLECTION_NAME))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation("list claims", CLAIM_COLLECTION_NAME))?;
        documents.into_iter().map(ClaimEntity::try_from).collect()
    }

    async fn count_pending_claims(&self) -> MongoResult<u64> {
        self.claims()
            .await
            .count_documents(doc! { "status": ClaimStatus::Pending.as_str() })
            .await
            .map_err(MongoDaoError::operation("count claims", CLAIM_COLLECTION_NAME))
    }

    async fn read_state(&self, key: &'static str) -> MongoResult<Option<Value>> {
        let document = self
            .game_state()
            .await
            .find_one(doc! { "_id": key })
            .await
            .map_err(MongoDaoError::operation("read game state", STATE_COLLECTION_NAME))?;
        Ok(document.map(|document| document.value))
    }

    async fn write_state(&self, key: &'static str, value: Value) -> MongoResult<()> {
        let document = MongoStateDocument {
            key: key.to_owned(),
            value,
            updated_at: DateTime::now(),
        };
        self.game_state()
            .await
            .replace_one(doc! { "_id": key }, &document)
            .upsert(true)
            .await
            .map_err(MongoDaoError::operation("write game state", STATE_COLLECTION_NAME))?;
        Ok(())
    }

    async fn reset_game(&self) -> MongoResult<()> {
        self.claims()
            .await
            .delete_many(doc! {})
            .await
            .map_err(MongoDaoError::operation("clear claims", CLAIM_COLLECTION_NAME))?;

        self.names()
            .await
            .update_many(
                doc! {},
                doc! { "$set": {
                    "picked": false,
                    "picked_at": Bson::Null,
                    "pick_order": Bson::Null,
                } },
            )
            .await
            .map_err(MongoDaoError::operation("reset names", NAME_COLLECTION_NAME))?;

        self.tickets()
            .await
            .update_many(
                doc! {},
                doc! { "$set": {
                    "is_assigned": false,
                    "status": TicketStatus::Active.as_str(),
                    "player_name": Bson::Null,
                    "assigned_at": Bson::Null,
                    "claimed_at": Bson::Null,
                } },
            )
            .await
            .map_err(MongoDaoError::operation("reset tickets", TICKET_COLLECTION_NAME))?;

        self.counters()
            .await
            .delete_one(doc! { "_id": PICK_ORDER_COUNTER })
            .await
            .map_err(MongoDaoError::operation("reset pick order", COUNTER_COLLECTION_NAME))?;

        Ok(())
    }
}

async fn ping(database: &Database) -> Result<(), mongodb::error::Error> {
    database.run_command(doc! { "ping": 1 }).await.map(drop)
}

/// Build a client for `config` and wait until the deployment answers a ping.
///
/// Gives up after `config.connect_attempts` pings; the storage supervisor
/// decides whether to try again later.
async fn open_database(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut backoff = CONNECT_BACKOFF_START;
    let mut attempt = 1;
    loop {
        let Err(source) = ping(&database).await else {
            debug!(database = %config.database_name, attempt, "MongoDB answered ping");
            return Ok((client, database));
        };
        if attempt >= config.connect_attempts {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source,
            });
        }
        warn!(
            database = %config.database_name,
            attempt,
            error = %source,
            "MongoDB not answering yet"
        );
        sleep(backoff).await;
        backoff = (backoff * 2).min(CONNECT_BACKOFF_CAP);
        attempt += 1;
    }
}

impl MongoBingoStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = open_database(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.inner.database().await;
        let indexes: [(&'static str, &'static str, Document); 3] = [
            (
                TICKET_COLLECTION_NAME,
                "ticket_assignment_idx",
                doc! { "is_assigned": 1, "created_at": 1 },
            ),
            (
                TICKET_COLLECTION_NAME,
                "ticket_status_idx",
                doc! { "status": 1 },
            ),
            (
                CLAIM_COLLECTION_NAME,
                "claim_status_idx",
                doc! { "status": 1, "claimed_at": 1 },
            ),
        ];

        for (collection, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(index.to_owned())).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }
}

impl BingoStore for MongoBingoStore {
    fn seed_names(&self, names: Vec<String>) -> BoxFuture<'static, StorageResult<usize>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.seed_names(names).await.map_err(Into::into) })
    }

    fn list_names(&self) -> BoxFuture<'static, StorageResult<Vec<NameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_names().await.map_err(Into::into) })
    }

    fn mark_name_picked(
        &self,
        name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<NameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.mark_name_picked(name, at).await.map_err(Into::into) })
    }

    fn insert_tickets(&self, tickets: Vec<TicketEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_tickets(tickets).await.map_err(Into::into) })
    }

    fn count_tickets(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.count_tickets().await.map_err(Into::into) })
    }

    fn assign_free_ticket(
        &self,
        player_name: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.assign_free_ticket(player_name, at).await.map_err(Into::into) })
    }

    fn find_ticket(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.find_ticket(id).await.map_err(Into::into) })
    }

    fn list_winners(&self) -> BoxFuture<'static, StorageResult<Vec<TicketEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_winners().await.map_err(Into::into) })
    }

    fn transition_ticket(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.transition_ticket(id, from, to, at).await.map_err(Into::into) })
    }

    fn try_lock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.try_lock_claims(owner).await.map_err(Into::into) })
    }

    fn unlock_claims(&self, owner: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.unlock_claims(owner).await.map_err(Into::into) })
    }

    fn release_stale_locks(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.release_stale_locks().await.map_err(Into::into) })
    }

    fn insert_claim(&self, claim: NewClaim) -> BoxFuture<'static, StorageResult<ClaimEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_claim(claim).await.map_err(Into::into) })
    }

    fn find_claim(&self, id: u64) -> BoxFuture<'static, StorageResult<Option<ClaimEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.find_claim(id).await.map_err(Into::into) })
    }

    fn resolve_claim(
        &self,
        id: u64,
        to: ClaimStatus,
        verifier: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ClaimResolution>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.resolve_claim(id, to, verifier, at).await.map_err(Into::into) })
    }

    fn list_pending_claims(&self) -> BoxFuture<'static, StorageResult<Vec<ClaimEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_pending_claims().await.map_err(Into::into) })
    }

    fn count_pending_claims(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.count_pending_claims().await.map_err(Into::into) })
    }

    fn read_state(&self, key: &'static str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.read_state(key).await.map_err(Into::into) })
    }

    fn write_state(
        &self,
        key: &'static str,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.write_state(key, value).await.map_err(Into::into) })
    }

    fn reset_game(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reset_game().await.map_err(Into::into) })
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
