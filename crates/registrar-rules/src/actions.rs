//! Built-in actions.

use async_trait::async_trait;
use registrar_common::{AppResult, EventRef, Grants, IdentityRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::action::Action;
use crate::context::RuleContext;

/// Plugin id of the operation-grant action
pub const GRANT_OPERATIONS: &str = "grant_operations";

/// Plugin id of the message action
pub const SEND_MESSAGE: &str = "send_message";

// =============================================================================
// Operation grants
// =============================================================================

/// Grants a static set of operations; executing it has no effect.
pub struct GrantOperations {
    operations: Grants,
}

impl GrantOperations {
    pub fn new(operations: Grants) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Action for GrantOperations {
    fn plugin_id(&self) -> &str {
        GRANT_OPERATIONS
    }

    fn granted_operations(&self) -> &Grants {
        &self.operations
    }

    async fn execute(&self, _ctx: &RuleContext) -> AppResult<()> {
        Ok(())
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Who receives a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipients {
    /// Registrants of the registration in context
    Registrants,
    /// Account that created the registration in context
    RegistrationOwner,
    /// Registrants of every registration in context (scheduled triggers)
    AllRegistrants,
}

/// A rendered-later message handed to the delivery collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub template: String,
    pub event: EventRef,
    pub recipients: Vec<IdentityRef>,
}

/// Message delivery seam; templating and transport are external.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> AppResult<()>;
}

/// Messenger that only records deliveries in the trace log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessenger;

#[async_trait]
impl Messenger for TracingMessenger {
    async fn send(&self, message: &OutgoingMessage) -> AppResult<()> {
        tracing::info!(
            event = %message.event,
            template = %message.template,
            recipients = message.recipients.len(),
            "Message queued"
        );
        Ok(())
    }
}

/// Sends a templated message to identities derived from the context.
pub struct SendMessage {
    template: String,
    recipients: Recipients,
    messenger: Arc<dyn Messenger>,
}

impl SendMessage {
    pub fn new(
        template: impl Into<String>,
        recipients: Recipients,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            template: template.into(),
            recipients,
            messenger,
        }
    }

    fn recipients(&self, ctx: &RuleContext) -> Vec<IdentityRef> {
        let identities: BTreeSet<IdentityRef> = match self.recipients {
            Recipients::Registrants => ctx
                .registration
                .iter()
                .flat_map(|r| r.registrants.iter().map(|r| r.identity))
                .collect(),
            Recipients::RegistrationOwner => ctx
                .registration
                .as_ref()
                .and_then(|r| r.owner)
                .map(IdentityRef::user)
                .into_iter()
                .collect(),
            Recipients::AllRegistrants => ctx
                .registrations
                .iter()
                .flat_map(|r| r.registrants.iter().map(|r| r.identity))
                .collect(),
        };
        identities.into_iter().collect()
    }
}

#[async_trait]
impl Action for SendMessage {
    fn plugin_id(&self) -> &str {
        SEND_MESSAGE
    }

    async fn execute(&self, ctx: &RuleContext) -> AppResult<()> {
        let recipients = self.recipients(ctx);
        if recipients.is_empty() {
            tracing::debug!(template = %self.template, "No recipients, message skipped");
            return Ok(());
        }

        let message = OutgoingMessage {
            template: self.template.clone(),
            event: ctx.event.reference.clone(),
            recipients,
        };
        self.messenger.send(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventSettings, Registrant, Registration};
    use chrono::Utc;
    use mockall::mock;
    use registrar_common::{AppError, Operation};
    use uuid::Uuid;

    mock! {
        pub Outbox {}

        #[async_trait]
        impl Messenger for Outbox {
            async fn send(&self, message: &OutgoingMessage) -> AppResult<()>;
        }
    }

    fn registration(event: &EventRef, owner: Uuid, identities: &[Uuid]) -> Registration {
        let id = Uuid::new_v4();
        Registration {
            id,
            event: event.clone(),
            registration_type: "attendee".to_string(),
            owner: Some(owner),
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

    fn ctx() -> RuleContext {
        let event = Event::new(
            EventRef::new("meetup", Uuid::new_v4()),
            "Meetup",
            EventSettings::default(),
        );
        RuleContext::new(Arc::new(event))
    }

    #[tokio::test]
    async fn test_grant_operations_is_inert() {
        let action = GrantOperations::new([Operation::View].into_iter().collect());
        assert!(action.granted_operations().contains(&Operation::View));
        assert!(action.execute(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_message_to_registrants() {
        let ctx = ctx();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let reg = registration(&ctx.event.reference, alice, &[alice, bob]);
        let ctx = ctx.with_registration(reg);

        let mut outbox = MockOutbox::new();
        outbox
            .expect_send()
            .withf(|m| m.template == "confirmation" && m.recipients.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let action = SendMessage::new("confirmation", Recipients::Registrants, Arc::new(outbox));
        assert!(action.granted_operations().is_empty());
        action.execute(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_all_registrants_dedupes() {
        let ctx = ctx();
        let alice = Uuid::new_v4();
        let event = ctx.event.reference.clone();
        let ctx = ctx.with_registrations(vec![
            registration(&event, alice, &[alice]),
            registration(&event, alice, &[alice]),
        ]);

        let mut outbox = MockOutbox::new();
        outbox
            .expect_send()
            .withf(move |m| m.recipients == vec![IdentityRef::user(alice)])
            .times(1)
            .returning(|_| Ok(()));

        let action = SendMessage::new("reminder", Recipients::AllRegistrants, Arc::new(outbox));
        action.execute(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_without_recipients_skips() {
        let mut outbox = MockOutbox::new();
        outbox.expect_send().times(0);

        let action = SendMessage::new("reminder", Recipients::Registrants, Arc::new(outbox));
        action.execute(&ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_propagates_failure() {
        let ctx = ctx();
        let owner = Uuid::new_v4();
        let reg = registration(&ctx.event.reference, owner, &[owner]);
        let ctx = ctx.with_registration(reg);

        let mut outbox = MockOutbox::new();
        outbox
            .expect_send()
            .returning(|_| Err(AppError::TriggerExecution("smtp down".into())));

        let action = SendMessage::new("receipt", Recipients::RegistrationOwner, Arc::new(outbox));
        assert!(action.execute(&ctx).await.is_err());
    }
}
