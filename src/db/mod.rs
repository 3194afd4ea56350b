//! Database module
//!
//! Storage seams consumed by the services, plus the Postgres and in-memory
//! adapters implementing them.

pub mod connection;
pub mod memory;
pub mod repositories;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use registrar_common::{AppResult, ComponentId, EventRef, IdentityRef, TriggerId};
use registrar_rules::event::{Event, IdentityRecord, Registrant, Registration};
use registrar_rules::query::IdentityQuery;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub use connection::*;
pub use memory::MemoryStore;

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Read access to events, registrations and identities.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn load_event(&self, event: &EventRef) -> AppResult<Option<Event>>;

    /// Registrants across every registration of the event
    async fn count_registrants(&self, event: &EventRef) -> AppResult<i64>;

    /// Registrations of the event that include `identity`
    async fn count_identity_registrations(
        &self,
        identity: &IdentityRef,
        event: &EventRef,
    ) -> AppResult<i64>;

    async fn load_registrants(&self, event: &EventRef) -> AppResult<Vec<Registrant>>;

    async fn load_registrations(&self, event: &EventRef) -> AppResult<Vec<Registration>>;

    /// Execute a candidate-selection query
    async fn find_identities(&self, query: &IdentityQuery) -> AppResult<Vec<IdentityRecord>>;
}

/// A durable request to run one rule's actions at a future time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledTrigger {
    pub id: TriggerId,
    /// Condition or action id identifying the owning rule
    pub component_id: ComponentId,
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub claimed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTrigger {
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.is_none_or(|until| until <= now)
    }
}

/// Outcome of trying to claim a scheduled trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the trigger until the lease ends; attempts already incremented
    Claimed(ScheduledTrigger),
    /// Another worker holds the lease
    Leased,
    /// No such trigger
    Missing,
}

/// Durable queue of scheduled triggers.
#[async_trait]
pub trait TriggerQueue: Send + Sync {
    async fn enqueue(
        &self,
        component: ComponentId,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<ScheduledTrigger>;

    async fn get(&self, id: TriggerId) -> AppResult<Option<ScheduledTrigger>>;

    /// Atomically increment the attempt counter and lease the trigger.
    async fn claim(&self, id: TriggerId, now: DateTime<Utc>, lease: Duration) -> AppResult<Claim>;

    /// Drop the lease taken by claim number `attempt`, leaving the trigger pending.
    ///
    /// Returns false when the trigger is gone or has been claimed again since;
    /// a newer claim's lease is never touched.
    async fn release(&self, id: TriggerId, attempt: i32) -> AppResult<bool>;

    /// Delete the trigger if claim number `attempt` still owns it.
    ///
    /// Returns false when the trigger is gone or a newer claim owns it.
    async fn complete(&self, id: TriggerId, attempt: i32) -> AppResult<bool>;

    /// Unleased triggers scheduled at or before `now`, oldest first
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledTrigger>>;
}
