//! Common types used across registrar crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// Registration ID type
pub type RegistrationId = Uuid;

/// Registrant ID type
pub type RegistrantId = Uuid;

/// Identity ID type (users and other identity kinds)
pub type IdentityId = Uuid;

/// Rule ID type
pub type RuleId = Uuid;

/// Rule component (condition or action) ID type
pub type ComponentId = Uuid;

/// Scheduled trigger ID type
pub type TriggerId = Uuid;

/// Role name
pub type Role = String;

/// Identity used for anonymous visitors; never selectable as a registrant.
pub const ANONYMOUS_IDENTITY: IdentityId = Uuid::nil();

/// Role every signed-in account holds.
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// Permission allowing an account to register itself.
pub const PERMISSION_REGISTER_SELF: &str = "register self";

/// Permission allowing an account to register identities holding `role`.
pub fn register_role_permission(role: &str) -> String {
    format!("register role:{role}")
}

/// Reference to any entity that can host registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRef {
    pub entity_type: String,
    pub id: Uuid,
}

impl EventRef {
    pub fn new(entity_type: impl Into<String>, id: Uuid) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Kind of identity that can be registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Site account
    User,
    /// Contact record without a login
    Contact,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Contact => "contact",
        }
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(IdentityKind::User),
            "contact" => Ok(IdentityKind::Contact),
            other => Err(format!("unknown identity kind: {other}")),
        }
    }
}

/// Polymorphic identity reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityRef {
    pub kind: IdentityKind,
    pub id: IdentityId,
}

impl IdentityRef {
    pub fn user(id: IdentityId) -> Self {
        Self {
            kind: IdentityKind::User,
            id,
        }
    }

    pub fn contact(id: IdentityId) -> Self {
        Self {
            kind: IdentityKind::Contact,
            id,
        }
    }
}

/// CRUD operation on a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    View,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::View,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::View => "view",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "view" => Ok(Operation::View),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// Set of granted operations
pub type Grants = BTreeSet<Operation>;

/// Outcome of an access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessResult {
    Allowed,
    /// No opinion; callers treat it as not allowed unless another layer grants
    Neutral,
    Forbidden,
}

impl AccessResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessResult::Allowed)
    }
}

/// Remaining places on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainingCapacity {
    Unlimited,
    /// May be negative when a waitlist let registrations overflow capacity
    Limited(i64),
}

impl RemainingCapacity {
    /// Compute from a configured capacity and the live registrant count.
    /// A missing or negative capacity means unlimited.
    pub fn from_capacity(capacity: Option<i64>, registrants: i64) -> Self {
        match capacity {
            Some(capacity) if capacity >= 0 => RemainingCapacity::Limited(capacity - registrants),
            _ => RemainingCapacity::Unlimited,
        }
    }

    pub fn is_below(&self, places: i64) -> bool {
        match self {
            RemainingCapacity::Unlimited => false,
            RemainingCapacity::Limited(remaining) => *remaining < places,
        }
    }
}

impl std::fmt::Display for RemainingCapacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemainingCapacity::Unlimited => write!(f, "unlimited"),
            RemainingCapacity::Limited(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_capacity() {
        assert_eq!(
            RemainingCapacity::from_capacity(Some(5), 3),
            RemainingCapacity::Limited(2)
        );
        assert_eq!(
            RemainingCapacity::from_capacity(Some(2), 4),
            RemainingCapacity::Limited(-2)
        );
        assert_eq!(
            RemainingCapacity::from_capacity(None, 100),
            RemainingCapacity::Unlimited
        );
        assert_eq!(
            RemainingCapacity::from_capacity(Some(-1), 100),
            RemainingCapacity::Unlimited
        );
    }

    #[test]
    fn test_unlimited_is_never_below() {
        assert!(!RemainingCapacity::Unlimited.is_below(i64::MAX));
        assert!(RemainingCapacity::Limited(0).is_below(1));
        assert!(!RemainingCapacity::Limited(1).is_below(1));
    }

    #[test]
    fn test_operation_serde() {
        let json = serde_json::to_string(&Operation::Update).unwrap();
        assert_eq!(json, "\"update\"");
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("publish".parse::<Operation>().is_err());
    }

    #[test]
    fn test_role_permission() {
        assert_eq!(
            register_role_permission(AUTHENTICATED_ROLE),
            "register role:authenticated"
        );
    }
}
