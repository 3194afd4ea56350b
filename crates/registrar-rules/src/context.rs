//! Context types for rule evaluation.
//!
//! A context carries the event plus whatever the caller knows about the
//! operation: the registration being acted on, the acting account, or the
//! full registration list when a scheduled trigger fires.

use registrar_common::IdentityRef;
use serde::Serialize;
use std::sync::Arc;

use crate::event::{Account, Event, Registration};

/// Evaluation context passed to conditions and actions.
#[derive(Debug, Clone, Serialize)]
pub struct RuleContext {
    /// Event the rules are attached to
    pub event: Arc<Event>,
    /// Registration being created, viewed or modified
    pub registration: Option<Registration>,
    /// Account performing the operation
    pub account: Option<Account>,
    /// Identity being registered, when it differs from the account
    pub identity: Option<IdentityRef>,
    /// Registration type requested for a registration not yet created
    pub registration_type: Option<String>,
    /// Every current registration of the event (scheduled triggers)
    pub registrations: Vec<Registration>,
}

impl RuleContext {
    pub fn new(event: Arc<Event>) -> Self {
        Self {
            event,
            registration: None,
            account: None,
            identity: None,
            registration_type: None,
            registrations: Vec::new(),
        }
    }

    /// Set the registration being acted on
    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Set the acting account
    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    /// Set the identity being registered
    pub fn with_identity(mut self, identity: IdentityRef) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the requested registration type
    pub fn with_registration_type(mut self, registration_type: impl Into<String>) -> Self {
        self.registration_type = Some(registration_type.into());
        self
    }

    /// Registration type in play: the registration's own, else the requested one.
    pub fn effective_registration_type(&self) -> Option<&str> {
        self.registration
            .as_ref()
            .map(|r| r.registration_type.as_str())
            .or(self.registration_type.as_deref())
    }

    /// Attach the event's registrations
    pub fn with_registrations(mut self, registrations: Vec<Registration>) -> Self {
        self.registrations = registrations;
        self
    }

    /// Identity being registered; falls back to the acting account's own.
    pub fn target_identity(&self) -> Option<IdentityRef> {
        self.identity
            .or_else(|| self.account.as_ref().map(Account::identity))
    }
}
