//! Scheduled trigger processing.
//!
//! A scheduled trigger names one rule component and a time. Processing claims
//! the entry (bumping its attempt counter before any action runs), executes
//! every action of the owning rule against the event's registrations, and
//! deletes the entry on success. A failed run leaves the entry pending.
//!
//! A run is bounded by its lease. Releasing and deleting are keyed on the
//! claim's attempt number, so a worker that overran its lease never clears or
//! deletes an entry someone else has claimed since.

use chrono::{DateTime, Duration, Utc};
use registrar_common::{AppError, AppResult, ComponentId, TriggerId};
use registrar_rules::context::RuleContext;
use registrar_rules::evaluator::RuleEvaluator;
use registrar_rules::store::RuleStore;
use std::sync::Arc;

use crate::db::{Claim, RegistrationStore, ScheduledTrigger, TriggerQueue};

/// Result of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Every action ran and the entry was deleted
    Completed,
    /// The entry no longer exists
    AlreadyCompleted,
    /// Another worker holds the entry's lease
    InFlight,
    /// The owning rule or event is gone; the entry was deleted unrun
    Discarded,
}

/// Counts from one pass over due triggers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct ScheduledTriggerProcessor {
    queue: Arc<dyn TriggerQueue>,
    store: Arc<dyn RegistrationStore>,
    rules: Arc<dyn RuleStore>,
    evaluator: Arc<RuleEvaluator>,
    lease: Duration,
}

impl ScheduledTriggerProcessor {
    pub fn new(
        queue: Arc<dyn TriggerQueue>,
        store: Arc<dyn RegistrationStore>,
        rules: Arc<dyn RuleStore>,
        evaluator: Arc<RuleEvaluator>,
        lease_secs: i64,
    ) -> Self {
        Self {
            queue,
            store,
            rules,
            evaluator,
            lease: Duration::seconds(lease_secs),
        }
    }

    /// Enqueue the rule owning `component` to run at `scheduled_for`
    pub async fn schedule(
        &self,
        component: ComponentId,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<ScheduledTrigger> {
        let trigger = self.queue.enqueue(component, scheduled_for).await?;
        tracing::debug!(
            trigger = %trigger.id,
            component = %component,
            scheduled_for = %scheduled_for,
            "Trigger scheduled"
        );
        Ok(trigger)
    }

    pub async fn due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledTrigger>> {
        self.queue.due(now, limit).await
    }

    /// Process one scheduled trigger.
    pub async fn process(&self, id: TriggerId) -> AppResult<ProcessOutcome> {
        let trigger = match self.queue.claim(id, Utc::now(), self.lease).await? {
            Claim::Claimed(trigger) => trigger,
            Claim::Leased => return Ok(ProcessOutcome::InFlight),
            Claim::Missing => return Ok(ProcessOutcome::AlreadyCompleted),
        };

        // Actions must finish inside the lease; past it another worker may claim.
        let remaining = trigger
            .claimed_until
            .map(|until| (until - Utc::now()).to_std().unwrap_or_default())
            .unwrap_or_else(|| self.lease.to_std().unwrap_or_default());
        let result = match tokio::time::timeout(remaining, self.run(&trigger)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TriggerExecution(format!(
                "trigger {} did not finish within its lease",
                id
            ))),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                match self.queue.release(id, trigger.attempts).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(
                        trigger = %id,
                        attempts = trigger.attempts,
                        "Lease already taken over; not releasing"
                    ),
                    Err(release) => {
                        tracing::warn!("Failed to release trigger {}: {}", id, release)
                    }
                }
                tracing::error!(
                    trigger = %id,
                    attempts = trigger.attempts,
                    "Scheduled trigger failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run(&self, trigger: &ScheduledTrigger) -> AppResult<ProcessOutcome> {
        let Some(record) = self
            .rules
            .find_rule_by_component(trigger.component_id)
            .await?
        else {
            return self.discard(trigger, "rule no longer exists").await;
        };
        let Some(event) = self.store.load_event(&record.event).await? else {
            return self.discard(trigger, "event no longer exists").await;
        };

        let rule = self.evaluator.registry().compile(&record)?;
        let registrations = self.store.load_registrations(&record.event).await?;
        let ctx = RuleContext::new(Arc::new(event)).with_registrations(registrations);

        let executed = self
            .evaluator
            .execute_actions(&rule, &ctx)
            .await
            .map_err(|(executed, e)| {
                AppError::TriggerExecution(format!(
                    "trigger {} stopped after {} action(s): {}",
                    trigger.id, executed, e
                ))
            })?;

        if !self.queue.complete(trigger.id, trigger.attempts).await? {
            tracing::warn!(
                trigger = %trigger.id,
                attempts = trigger.attempts,
                "Trigger was claimed again before completion; leaving it to the newer claim"
            );
        }
        tracing::info!(
            trigger = %trigger.id,
            rule = %record.id,
            actions = executed,
            attempts = trigger.attempts,
            "Scheduled trigger completed"
        );
        Ok(ProcessOutcome::Completed)
    }

    async fn discard(&self, trigger: &ScheduledTrigger, reason: &str) -> AppResult<ProcessOutcome> {
        tracing::warn!(
            trigger = %trigger.id,
            component = %trigger.component_id,
            "Discarding scheduled trigger: {}",
            reason
        );
        self.queue.complete(trigger.id, trigger.attempts).await?;
        Ok(ProcessOutcome::Discarded)
    }

    /// Process every due trigger one at a time.
    ///
    /// Failures are counted, not propagated; failed entries stay pending.
    pub async fn process_due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<BatchSummary> {
        let mut summary = BatchSummary::default();
        for trigger in self.due(now, limit).await? {
            match self.process(trigger.id).await {
                Ok(ProcessOutcome::Completed) | Ok(ProcessOutcome::Discarded) => {
                    summary.completed += 1
                }
                Ok(ProcessOutcome::AlreadyCompleted) | Ok(ProcessOutcome::InFlight) => {
                    summary.skipped += 1
                }
                Err(_) => summary.failed += 1,
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use async_trait::async_trait;
    use mockall::mock;
    use registrar_common::{EventRef, IdentityRef};
    use registrar_rules::actions::{Messenger, OutgoingMessage};
    use registrar_rules::config::{ActionConfig, RuleDefinition, params};
    use registrar_rules::event::{Event, EventSettings, Registrant, Registration};
    use registrar_rules::registry::builtin_registry;
    use registrar_rules::rule::RuleRecord;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    mock! {
        pub Queue {}

        #[async_trait]
        impl TriggerQueue for Queue {
            async fn enqueue(
                &self,
                component: ComponentId,
                scheduled_for: DateTime<Utc>,
            ) -> AppResult<ScheduledTrigger>;
            async fn get(&self, id: TriggerId) -> AppResult<Option<ScheduledTrigger>>;
            async fn claim(
                &self,
                id: TriggerId,
                now: DateTime<Utc>,
                lease: Duration,
            ) -> AppResult<Claim>;
            async fn release(&self, id: TriggerId, attempt: i32) -> AppResult<bool>;
            async fn complete(&self, id: TriggerId, attempt: i32) -> AppResult<bool>;
            async fn due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledTrigger>>;
        }
    }

    /// Messenger that fails while `down` is set and hangs while `stalled` is set
    #[derive(Default)]
    struct Outbox {
        down: AtomicBool,
        stalled: AtomicBool,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl Messenger for Outbox {
        async fn send(&self, message: &OutgoingMessage) -> AppResult<()> {
            if self.stalled.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(AppError::TriggerExecution("mail relay down".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        outbox: Arc<Outbox>,
        processor: ScheduledTriggerProcessor,
        rule: RuleRecord,
        event: EventRef,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(Outbox::default());
        let event = EventRef::new("meetup", Uuid::new_v4());
        store
            .insert_event(Event::new(event.clone(), "Meetup", EventSettings::default()))
            .await;

        let reminder = RuleDefinition::new("scheduled").action(ActionConfig::new(
            "send_message",
            params([
                ("template", json!("reminder")),
                ("recipients", json!("all_registrants")),
            ]),
        ));
        let rule = store.append_rule(&event, &reminder, false).await.unwrap();

        let registry = builtin_registry(store.clone(), outbox.clone());
        let evaluator = Arc::new(RuleEvaluator::new(store.clone(), Arc::new(registry)));
        let processor = ScheduledTriggerProcessor::new(
            store.clone(),
            store.clone(),
            store.clone(),
            evaluator,
            300,
        );

        Fixture {
            store,
            outbox,
            processor,
            rule,
            event,
        }
    }

    async fn register(store: &MemoryStore, event: &EventRef) -> IdentityRef {
        let id = Uuid::new_v4();
        let identity = IdentityRef::user(Uuid::new_v4());
        store
            .insert_registration(Registration {
                id,
                event: event.clone(),
                registration_type: "attendee".to_string(),
                owner: Some(identity.id),
                registrants: vec![Registrant {
                    id: Uuid::new_v4(),
                    registration: id,
                    identity,
                }],
                created_at: Utc::now(),
            })
            .await;
        identity
    }

    #[tokio::test]
    async fn test_failed_run_is_retried() {
        let f = fixture().await;
        register(&f.store, &f.event).await;
        let trigger = f
            .processor
            .schedule(f.rule.actions[0].id, Utc::now())
            .await
            .unwrap();
        assert_eq!(trigger.attempts, 0);

        f.outbox.down.store(true, Ordering::SeqCst);
        let err = f.processor.process(trigger.id).await.unwrap_err();
        assert_eq!(err.error_code(), "TRIGGER_EXECUTION_FAILURE");

        let pending = f.store.get(trigger.id).await.unwrap().unwrap();
        assert_eq!(pending.attempts, 1);
        assert!(pending.claimed_until.is_none());

        f.outbox.down.store(false, Ordering::SeqCst);
        let outcome = f.processor.process(trigger.id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Completed);
        assert!(f.store.get(trigger.id).await.unwrap().is_none());
        assert_eq!(f.outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_context_holds_every_registration() {
        let f = fixture().await;
        let first = register(&f.store, &f.event).await;
        let second = register(&f.store, &f.event).await;
        let trigger = f
            .processor
            .schedule(f.rule.actions[0].id, Utc::now())
            .await
            .unwrap();

        f.processor.process(trigger.id).await.unwrap();

        let sent = f.outbox.sent.lock().unwrap();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(sent[0].recipients, expected);
    }

    #[tokio::test]
    async fn test_missing_trigger_is_already_completed() {
        let f = fixture().await;
        let id = Uuid::new_v4();
        assert_eq!(
            f.processor.process(id).await.unwrap(),
            ProcessOutcome::AlreadyCompleted
        );
        assert_eq!(
            f.processor.process(id).await.unwrap(),
            ProcessOutcome::AlreadyCompleted
        );
    }

    #[tokio::test]
    async fn test_leased_trigger_is_in_flight() {
        let f = fixture().await;
        let trigger = f
            .processor
            .schedule(f.rule.actions[0].id, Utc::now())
            .await
            .unwrap();
        f.store
            .claim(trigger.id, Utc::now(), Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(
            f.processor.process(trigger.id).await.unwrap(),
            ProcessOutcome::InFlight
        );
        assert!(f.outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_trigger_is_discarded() {
        let f = fixture().await;
        let trigger = f
            .processor
            .schedule(f.rule.actions[0].id, Utc::now())
            .await
            .unwrap();
        f.store.remove_rule(f.rule.id).await;

        assert_eq!(
            f.processor.process(trigger.id).await.unwrap(),
            ProcessOutcome::Discarded
        );
        assert!(f.store.get(trigger.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_due() {
        let f = fixture().await;
        register(&f.store, &f.event).await;
        let now = Utc::now();
        f.processor
            .schedule(f.rule.actions[0].id, now - Duration::minutes(5))
            .await
            .unwrap();
        f.processor
            .schedule(f.rule.actions[0].id, now + Duration::hours(1))
            .await
            .unwrap();

        let summary = f.processor.process_due(now, 10).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                completed: 1,
                failed: 0,
                skipped: 0
            }
        );
        assert_eq!(f.processor.due(now + Duration::hours(2), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_failure_keeps_run_error() {
        let f = fixture().await;
        register(&f.store, &f.event).await;
        let claimed = ScheduledTrigger {
            id: Uuid::new_v4(),
            component_id: f.rule.actions[0].id,
            scheduled_for: Utc::now(),
            attempts: 1,
            claimed_until: Some(Utc::now() + Duration::minutes(5)),
            created_at: Utc::now(),
        };

        let mut queue = MockQueue::new();
        let returned = claimed.clone();
        queue
            .expect_claim()
            .times(1)
            .returning(move |_, _, _| Ok(Claim::Claimed(returned.clone())));
        queue
            .expect_release()
            .times(1)
            .returning(|_, _| Err(AppError::Database("connection reset".into())));
        queue.expect_complete().never();

        let registry = builtin_registry(f.store.clone(), f.outbox.clone());
        let evaluator = Arc::new(RuleEvaluator::new(f.store.clone(), Arc::new(registry)));
        let processor = ScheduledTriggerProcessor::new(
            Arc::new(queue),
            f.store.clone(),
            f.store.clone(),
            evaluator,
            300,
        );

        f.outbox.down.store(true, Ordering::SeqCst);
        let err = processor.process(claimed.id).await.unwrap_err();
        assert!(matches!(err, AppError::TriggerExecution(_)));
    }

    #[tokio::test]
    async fn test_claim_error_propagates() {
        let f = fixture().await;
        let mut queue = MockQueue::new();
        queue
            .expect_claim()
            .returning(|_, _, _| Err(AppError::Database("pool timed out".into())));
        queue.expect_release().never();

        let registry = builtin_registry(f.store.clone(), f.outbox.clone());
        let evaluator = Arc::new(RuleEvaluator::new(f.store.clone(), Arc::new(registry)));
        let processor = ScheduledTriggerProcessor::new(
            Arc::new(queue),
            f.store.clone(),
            f.store.clone(),
            evaluator,
            300,
        );

        let err = processor.process(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    fn processor_over(f: &Fixture, queue: MockQueue) -> ScheduledTriggerProcessor {
        let registry = builtin_registry(f.store.clone(), f.outbox.clone());
        let evaluator = Arc::new(RuleEvaluator::new(f.store.clone(), Arc::new(registry)));
        ScheduledTriggerProcessor::new(
            Arc::new(queue),
            f.store.clone(),
            f.store.clone(),
            evaluator,
            300,
        )
    }

    #[tokio::test]
    async fn test_failure_releases_only_its_own_claim() {
        let f = fixture().await;
        register(&f.store, &f.event).await;
        let claimed = ScheduledTrigger {
            id: Uuid::new_v4(),
            component_id: f.rule.actions[0].id,
            scheduled_for: Utc::now(),
            attempts: 3,
            claimed_until: Some(Utc::now() + Duration::minutes(5)),
            created_at: Utc::now(),
        };

        let mut queue = MockQueue::new();
        let returned = claimed.clone();
        queue
            .expect_claim()
            .returning(move |_, _, _| Ok(Claim::Claimed(returned.clone())));
        queue
            .expect_release()
            .withf(|_, attempt| *attempt == 3)
            .times(1)
            .returning(|_, _| Ok(false));
        let processor = processor_over(&f, queue);

        f.outbox.down.store(true, Ordering::SeqCst);
        let err = processor.process(claimed.id).await.unwrap_err();
        assert_eq!(err.error_code(), "TRIGGER_EXECUTION_FAILURE");
    }

    #[tokio::test]
    async fn test_run_past_lease_is_abandoned() {
        let f = fixture().await;
        register(&f.store, &f.event).await;
        let claimed = ScheduledTrigger {
            id: Uuid::new_v4(),
            component_id: f.rule.actions[0].id,
            scheduled_for: Utc::now(),
            attempts: 1,
            claimed_until: Some(Utc::now() - Duration::seconds(1)),
            created_at: Utc::now(),
        };

        let mut queue = MockQueue::new();
        let returned = claimed.clone();
        queue
            .expect_claim()
            .returning(move |_, _, _| Ok(Claim::Claimed(returned.clone())));
        queue.expect_release().times(1).returning(|_, _| Ok(true));
        queue.expect_complete().never();
        let processor = processor_over(&f, queue);

        f.outbox.stalled.store(true, Ordering::SeqCst);
        let err = processor.process(claimed.id).await.unwrap_err();
        assert!(matches!(err, AppError::TriggerExecution(_)));
        assert!(f.outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_claim_does_not_free_newer_lease() {
        let f = fixture().await;
        let trigger = f
            .processor
            .schedule(f.rule.actions[0].id, Utc::now())
            .await
            .unwrap();
        let t0 = Utc::now();
        let lease = Duration::seconds(60);

        let Claim::Claimed(stale) = f.store.claim(trigger.id, t0, lease).await.unwrap() else {
            panic!("expected claim");
        };
        let t1 = t0 + Duration::seconds(61);
        let Claim::Claimed(_) = f.store.claim(trigger.id, t1, lease).await.unwrap() else {
            panic!("expected claim after expiry");
        };

        assert!(!f.store.release(trigger.id, stale.attempts).await.unwrap());
        assert_eq!(f.store.claim(trigger.id, t1, lease).await.unwrap(), Claim::Leased);
    }
}
