//! In-memory storage adapter.
//!
//! Implements every storage seam over a single lock. Used by tests and by
//! embedders that keep registrations elsewhere and only need the engine.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use registrar_common::{
    AUTHENTICATED_ROLE, AppResult, ComponentId, EventRef, IdentityId, IdentityRef, Role,
    TriggerId,
};
use registrar_rules::config::RuleDefinition;
use registrar_rules::directory::AccountDirectory;
use registrar_rules::event::{Account, Event, IdentityRecord, Registrant, Registration};
use registrar_rules::query::IdentityQuery;
use registrar_rules::rule::{RuleRecord, RuleScope};
use registrar_rules::store::RuleStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Claim, RegistrationStore, ScheduledTrigger, TriggerQueue};

#[derive(Default)]
struct State {
    events: HashMap<EventRef, Event>,
    registrations: Vec<Registration>,
    identities: BTreeMap<IdentityId, IdentityRecord>,
    role_permissions: BTreeMap<Role, BTreeSet<String>>,
    /// Attachment order
    rules: Vec<RuleRecord>,
    triggers: BTreeMap<TriggerId, ScheduledTrigger>,
}

impl State {
    fn roles_of(&self, account: &Account) -> BTreeSet<Role> {
        if account.is_anonymous() {
            return BTreeSet::new();
        }
        let mut roles = self
            .identities
            .get(&account.id)
            .map(|record| record.roles.clone())
            .unwrap_or_default();
        roles.insert(AUTHENTICATED_ROLE.to_string());
        roles
    }
}

/// Storage adapter keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        let mut state = self.state.write().await;
        state.events.insert(event.reference.clone(), event);
    }

    pub async fn remove_event(&self, event: &EventRef) {
        let mut state = self.state.write().await;
        state.events.remove(event);
        state.registrations.retain(|r| &r.event != event);
        state.rules.retain(|r| &r.event != event);
    }

    pub async fn insert_registration(&self, registration: Registration) {
        self.state.write().await.registrations.push(registration);
    }

    pub async fn insert_identity(&self, record: IdentityRecord) {
        let mut state = self.state.write().await;
        for role in &record.roles {
            state.role_permissions.entry(role.clone()).or_default();
        }
        state.identities.insert(record.identity.id, record);
    }

    /// Give every holder of `role` a permission
    pub async fn grant_permission(&self, role: &str, permission: impl Into<String>) {
        let mut state = self.state.write().await;
        state
            .role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(permission.into());
    }

    pub async fn remove_rule(&self, rule: Uuid) {
        self.state.write().await.rules.retain(|r| r.id != rule);
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn load_event(&self, event: &EventRef) -> AppResult<Option<Event>> {
        Ok(self.state.read().await.events.get(event).cloned())
    }

    async fn count_registrants(&self, event: &EventRef) -> AppResult<i64> {
        let state = self.state.read().await;
        let count = state
            .registrations
            .iter()
            .filter(|r| &r.event == event)
            .map(|r| r.registrants.len())
            .sum::<usize>();
        Ok(count as i64)
    }

    async fn count_identity_registrations(
        &self,
        identity: &IdentityRef,
        event: &EventRef,
    ) -> AppResult<i64> {
        let state = self.state.read().await;
        let count = state
            .registrations
            .iter()
            .filter(|r| &r.event == event && r.has_registrant(identity))
            .count();
        Ok(count as i64)
    }

    async fn load_registrants(&self, event: &EventRef) -> AppResult<Vec<Registrant>> {
        let state = self.state.read().await;
        Ok(state
            .registrations
            .iter()
            .filter(|r| &r.event == event)
            .flat_map(|r| r.registrants.iter().cloned())
            .collect())
    }

    async fn load_registrations(&self, event: &EventRef) -> AppResult<Vec<Registration>> {
        let state = self.state.read().await;
        Ok(state
            .registrations
            .iter()
            .filter(|r| &r.event == event)
            .cloned()
            .collect())
    }

    async fn find_identities(&self, query: &IdentityQuery) -> AppResult<Vec<IdentityRecord>> {
        if query.is_forced_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut found: Vec<IdentityRecord> = state
            .identities
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.identity.id.cmp(&b.identity.id)));
        Ok(found)
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn load_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        scope: RuleScope,
    ) -> AppResult<Vec<RuleRecord>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .iter()
            .filter(|r| &r.event == event && r.trigger == trigger && scope.includes(r.is_default))
            .cloned()
            .collect())
    }

    async fn find_rule_by_component(
        &self,
        component: ComponentId,
    ) -> AppResult<Option<RuleRecord>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .iter()
            .find(|r| r.has_component(component))
            .cloned())
    }

    async fn replace_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        definitions: &[RuleDefinition],
        is_default: bool,
    ) -> AppResult<Vec<RuleRecord>> {
        let records: Vec<RuleRecord> = definitions
            .iter()
            .filter(|d| d.trigger == trigger)
            .map(|d| RuleRecord::from_definition(event.clone(), d.clone(), is_default))
            .collect();

        let mut state = self.state.write().await;
        state
            .rules
            .retain(|r| !(&r.event == event && r.trigger == trigger));
        state.rules.extend(records.iter().cloned());
        Ok(records)
    }

    async fn append_rule(
        &self,
        event: &EventRef,
        definition: &RuleDefinition,
        is_default: bool,
    ) -> AppResult<RuleRecord> {
        let record = RuleRecord::from_definition(event.clone(), definition.clone(), is_default);
        self.state.write().await.rules.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn has_permission(&self, account: &Account, permission: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.roles_of(account).iter().any(|role| {
            state
                .role_permissions
                .get(role)
                .is_some_and(|perms| perms.contains(permission))
        }))
    }

    async fn roles_of(&self, account: &Account) -> AppResult<BTreeSet<Role>> {
        Ok(self.state.read().await.roles_of(account))
    }

    async fn roles(&self) -> AppResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: BTreeSet<Role> = state.role_permissions.keys().cloned().collect();
        roles.insert(AUTHENTICATED_ROLE.to_string());
        Ok(roles.into_iter().collect())
    }
}

#[async_trait]
impl TriggerQueue for MemoryStore {
    async fn enqueue(
        &self,
        component: ComponentId,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<ScheduledTrigger> {
        let trigger = ScheduledTrigger {
            id: Uuid::new_v4(),
            component_id: component,
            scheduled_for,
            attempts: 0,
            claimed_until: None,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .triggers
            .insert(trigger.id, trigger.clone());
        Ok(trigger)
    }

    async fn get(&self, id: TriggerId) -> AppResult<Option<ScheduledTrigger>> {
        Ok(self.state.read().await.triggers.get(&id).cloned())
    }

    async fn claim(&self, id: TriggerId, now: DateTime<Utc>, lease: Duration) -> AppResult<Claim> {
        let mut state = self.state.write().await;
        let Some(trigger) = state.triggers.get_mut(&id) else {
            return Ok(Claim::Missing);
        };
        if !trigger.is_claimable(now) {
            return Ok(Claim::Leased);
        }

        trigger.attempts += 1;
        trigger.claimed_until = Some(now + lease);
        Ok(Claim::Claimed(trigger.clone()))
    }

    async fn release(&self, id: TriggerId, attempt: i32) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.triggers.get_mut(&id) {
            Some(trigger) if trigger.attempts == attempt => {
                trigger.claimed_until = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, id: TriggerId, attempt: i32) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.triggers.get(&id).is_some_and(|t| t.attempts == attempt) {
            state.triggers.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledTrigger>> {
        let state = self.state.read().await;
        let mut due: Vec<ScheduledTrigger> = state
            .triggers
            .values()
            .filter(|t| t.scheduled_for <= now && t.is_claimable(now))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.scheduled_for);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}
