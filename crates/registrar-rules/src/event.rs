//! Domain entities the engine reads: events, registrations and accounts.

use chrono::{DateTime, Utc};
use registrar_common::{
    ANONYMOUS_IDENTITY, EventRef, IdentityId, IdentityKind, IdentityRef, RegistrantId,
    RegistrationId, Role,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::RuleDefinition;

/// A registration type configured on an event (e.g. "attendee", "speaker")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationType {
    pub id: String,
    pub label: String,
}

impl RegistrationType {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Who may be registered on someone else's behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPolicy {
    /// Whether an account may register identities other than its own
    pub allow_proxy: bool,
    /// Identity kinds accepted as registrants
    pub identity_kinds: BTreeSet<IdentityKind>,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            allow_proxy: false,
            identity_kinds: BTreeSet::from([IdentityKind::User]),
        }
    }
}

/// Event-type configuration applied to one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Registration feature switch for this event
    #[serde(default)]
    pub accepting: bool,
    /// Maximum registrants; `None` or a negative value is unlimited
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub allow_waitlist: bool,
    /// Allowed registration types, in display order
    #[serde(default)]
    pub registration_types: Vec<RegistrationType>,
    #[serde(default)]
    pub allow_duplicate_registrants: bool,
    #[serde(default)]
    pub proxy: ProxyPolicy,
    #[serde(default)]
    pub allow_custom_rules: bool,
    /// Rules the event type installs by default
    #[serde(default)]
    pub default_rules: Vec<RuleDefinition>,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            accepting: false,
            capacity: None,
            allow_waitlist: false,
            registration_types: Vec::new(),
            allow_duplicate_registrants: false,
            proxy: ProxyPolicy::default(),
            allow_custom_rules: false,
            default_rules: Vec::new(),
        }
    }
}

/// An entity hosting registrations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub reference: EventRef,
    pub title: String,
    pub settings: EventSettings,
}

impl Event {
    pub fn new(reference: EventRef, title: impl Into<String>, settings: EventSettings) -> Self {
        Self {
            reference,
            title: title.into(),
            settings,
        }
    }
}

/// An identity attached to a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    pub id: RegistrantId,
    pub registration: RegistrationId,
    pub identity: IdentityRef,
}

/// One signup against an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub event: EventRef,
    pub registration_type: String,
    /// Account that created the registration
    pub owner: Option<IdentityId>,
    pub registrants: Vec<Registrant>,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    pub fn has_registrant(&self, identity: &IdentityRef) -> bool {
        self.registrants.iter().any(|r| &r.identity == identity)
    }
}

/// The account performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: IdentityId,
    pub name: String,
}

impl Account {
    pub fn new(id: IdentityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_IDENTITY, "anonymous")
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_IDENTITY
    }

    /// The registrable identity backing this account
    pub fn identity(&self) -> IdentityRef {
        IdentityRef::user(self.id)
    }
}

/// An identity row as seen by candidate selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity: IdentityRef,
    pub name: String,
    pub roles: BTreeSet<Role>,
}
