//! Derived registration state of one event.

use registrar_common::{AppError, AppResult, EventRef, IdentityKind, IdentityRef, RemainingCapacity};
use registrar_rules::config::RuleDefinition;
use registrar_rules::event::{Event, Registrant, Registration, RegistrationType};
use registrar_rules::rule::{RuleRecord, RuleScope};
use registrar_rules::store::RuleStore;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::RegistrationStore;

/// Read-mostly facade over an event's settings, counts and rules.
///
/// Counts are read live on every call; nothing is cached between calls.
#[derive(Clone)]
pub struct EventMeta {
    event: Arc<Event>,
    store: Arc<dyn RegistrationStore>,
    rules: Arc<dyn RuleStore>,
}

impl EventMeta {
    pub fn new(
        event: Arc<Event>,
        store: Arc<dyn RegistrationStore>,
        rules: Arc<dyn RuleStore>,
    ) -> Self {
        Self {
            event,
            store,
            rules,
        }
    }

    /// Load the event, failing with a configuration error when it does not exist
    pub async fn load(
        store: Arc<dyn RegistrationStore>,
        rules: Arc<dyn RuleStore>,
        event: &EventRef,
    ) -> AppResult<Self> {
        let loaded = store
            .load_event(event)
            .await?
            .ok_or_else(|| AppError::Configuration(format!("Event {event} does not exist")))?;

        Ok(Self::new(Arc::new(loaded), store, rules))
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn reference(&self) -> &EventRef {
        &self.event.reference
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    pub async fn count_registrants(&self) -> AppResult<i64> {
        self.store.count_registrants(self.reference()).await
    }

    /// Capacity minus current registrants; unlimited when no capacity is set
    pub async fn remaining_capacity(&self) -> AppResult<RemainingCapacity> {
        let capacity = self.event.settings.capacity;
        if !matches!(capacity, Some(c) if c >= 0) {
            return Ok(RemainingCapacity::Unlimited);
        }
        let registrants = self.count_registrants().await?;
        Ok(RemainingCapacity::from_capacity(capacity, registrants))
    }

    /// Registrants across every registration of this event
    pub async fn registrants(&self) -> AppResult<Vec<Registrant>> {
        self.store.load_registrants(self.reference()).await
    }

    pub async fn registrations(&self) -> AppResult<Vec<Registration>> {
        self.store.load_registrations(self.reference()).await
    }

    /// Registrations of this event that already include `identity`
    pub async fn identity_registration_count(&self, identity: &IdentityRef) -> AppResult<i64> {
        self.store
            .count_identity_registrations(identity, self.reference())
            .await
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn is_accepting_registrations(&self) -> bool {
        self.event.settings.accepting
    }

    pub fn allow_wait_list(&self) -> bool {
        self.event.settings.allow_waitlist
    }

    pub fn duplicate_registrants_allowed(&self) -> bool {
        self.event.settings.allow_duplicate_registrants
    }

    pub fn can_register_proxy_identities(&self) -> bool {
        self.event.settings.proxy.allow_proxy
    }

    pub fn proxy_identity_kinds(&self) -> &BTreeSet<IdentityKind> {
        &self.event.settings.proxy.identity_kinds
    }

    pub fn allow_custom_rules(&self) -> bool {
        self.event.settings.allow_custom_rules
    }

    pub fn registration_type_is_valid(&self, registration_type: &str) -> bool {
        self.event
            .settings
            .registration_types
            .iter()
            .any(|t| t.id == registration_type)
    }

    /// Configured registration types, in configured order
    pub fn registration_types(&self) -> &[RegistrationType] {
        &self.event.settings.registration_types
    }

    /// With exactly one type the caller can skip the type-selection step
    pub fn requires_type_selection(&self) -> bool {
        self.registration_types().len() > 1
    }

    // =========================================================================
    // Rules
    // =========================================================================

    pub async fn rules(&self, trigger: &str, scope: RuleScope) -> AppResult<Vec<RuleRecord>> {
        self.rules.load_rules(self.reference(), trigger, scope).await
    }

    /// The event type's default rules for a trigger
    pub fn default_rules(&self, trigger: &str) -> Vec<RuleDefinition> {
        self.event
            .settings
            .default_rules
            .iter()
            .filter(|d| d.trigger == trigger)
            .cloned()
            .collect()
    }

    /// Whether the attached rules serialize identically to the defaults
    pub async fn is_default_rules(&self, trigger: &str) -> AppResult<bool> {
        let attached: Vec<RuleDefinition> = self
            .rules(trigger, RuleScope::All)
            .await?
            .iter()
            .map(RuleRecord::definition)
            .collect();

        let attached = serde_json::to_vec(&attached)?;
        let defaults = serde_json::to_vec(&self.default_rules(trigger))?;
        Ok(attached == defaults)
    }

    /// Replace the trigger's rules with the event type's defaults
    pub async fn reset_rules(&self, trigger: &str) -> AppResult<Vec<RuleRecord>> {
        let defaults = self.default_rules(trigger);
        let records = self
            .rules
            .replace_rules(self.reference(), trigger, &defaults, true)
            .await?;

        tracing::info!(
            event = %self.reference(),
            trigger,
            rules = records.len(),
            "Rules reset to defaults"
        );
        Ok(records)
    }

    /// Attach a rule authored for this event
    pub async fn attach_custom_rule(&self, definition: &RuleDefinition) -> AppResult<RuleRecord> {
        if !self.allow_custom_rules() {
            return Err(AppError::Configuration(format!(
                "Event {} does not allow custom rules",
                self.reference()
            )));
        }
        self.rules
            .append_rule(self.reference(), definition, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::Utc;
    use registrar_common::Operation;
    use registrar_rules::config::{ActionConfig, ConditionConfig};
    use registrar_rules::event::EventSettings;
    use uuid::Uuid;

    fn settings() -> EventSettings {
        EventSettings {
            accepting: true,
            capacity: Some(3),
            registration_types: vec![RegistrationType::new("attendee", "Attendee")],
            default_rules: vec![
                RuleDefinition::new("register")
                    .condition(ConditionConfig::plugin("current_user"))
                    .action(ActionConfig::grant([Operation::Create, Operation::View])),
            ],
            ..EventSettings::default()
        }
    }

    async fn load_meta(settings: EventSettings) -> (Arc<MemoryStore>, EventMeta) {
        let store = Arc::new(MemoryStore::new());
        let reference = EventRef::new("meetup", Uuid::new_v4());
        store
            .insert_event(Event::new(reference.clone(), "Meetup", settings))
            .await;
        let meta = EventMeta::load(store.clone(), store.clone(), &reference)
            .await
            .unwrap();
        (store, meta)
    }

    fn registration(event: &EventRef, identities: &[Uuid]) -> Registration {
        let id = Uuid::new_v4();
        Registration {
            id,
            event: event.clone(),
            registration_type: "attendee".to_string(),
            owner: identities.first().copied(),
            registrants: identities
                .iter()
                .map(|i| Registrant {
                    id: Uuid::new_v4(),
                    registration: id,
                    identity: IdentityRef::user(*i),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_event() {
        let store = Arc::new(MemoryStore::new());
        let result = EventMeta::load(
            store.clone(),
            store,
            &EventRef::new("meetup", Uuid::new_v4()),
        )
        .await;

        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_remaining_capacity() {
        let (store, meta) = load_meta(settings()).await;
        assert_eq!(meta.remaining_capacity().await.unwrap(), RemainingCapacity::Limited(3));

        let alice = Uuid::new_v4();
        store
            .insert_registration(registration(meta.reference(), &[alice, Uuid::new_v4()]))
            .await;
        assert_eq!(meta.remaining_capacity().await.unwrap(), RemainingCapacity::Limited(1));
        assert_eq!(
            meta.identity_registration_count(&IdentityRef::user(alice))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_unset_capacity_is_unlimited() {
        for capacity in [None, Some(-1)] {
            let (store, meta) = load_meta(EventSettings {
                capacity,
                ..settings()
            })
            .await;
            store
                .insert_registration(registration(meta.reference(), &[Uuid::new_v4()]))
                .await;
            assert_eq!(meta.remaining_capacity().await.unwrap(), RemainingCapacity::Unlimited);
        }
    }

    #[tokio::test]
    async fn test_registration_types() {
        let (_, meta) = load_meta(settings()).await;
        assert!(meta.registration_type_is_valid("attendee"));
        assert!(!meta.registration_type_is_valid("speaker"));
        assert!(!meta.requires_type_selection());

        let (_, meta) = load_meta(EventSettings {
            registration_types: vec![
                RegistrationType::new("attendee", "Attendee"),
                RegistrationType::new("speaker", "Speaker"),
            ],
            ..settings()
        })
        .await;
        assert!(meta.requires_type_selection());
        assert_eq!(meta.registration_types()[1].id, "speaker");
    }

    #[tokio::test]
    async fn test_default_rules_detection() {
        let (_, meta) = load_meta(EventSettings {
            allow_custom_rules: true,
            ..settings()
        })
        .await;

        assert!(!meta.is_default_rules("register").await.unwrap());

        meta.reset_rules("register").await.unwrap();
        assert!(meta.is_default_rules("register").await.unwrap());

        meta.attach_custom_rule(
            &RuleDefinition::new("register").action(ActionConfig::grant([Operation::Delete])),
        )
        .await
        .unwrap();
        assert!(!meta.is_default_rules("register").await.unwrap());
        assert_eq!(
            meta.rules("register", RuleScope::CustomOnly).await.unwrap().len(),
            1
        );

        meta.reset_rules("register").await.unwrap();
        assert!(meta.is_default_rules("register").await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_rules_disallowed() {
        let (_, meta) = load_meta(settings()).await;
        let err = meta
            .attach_custom_rule(&RuleDefinition::new("register"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
