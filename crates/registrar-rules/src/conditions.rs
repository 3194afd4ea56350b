//! Built-in conditions.
//!
//! Conditions that need account data call through [`AccountDirectory`]; a
//! failed lookup counts as "not satisfied".

use async_trait::async_trait;
use registrar_common::Role;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::condition::{Condition, Predicate, QueryFilter};
use crate::context::RuleContext;
use crate::directory::AccountDirectory;
use crate::query::IdentityFilter;

// =============================================================================
// Account rules
// =============================================================================

/// The acting account holds a role. As a query filter: the identity holds it.
pub struct UserRole {
    role: Role,
    directory: Arc<dyn AccountDirectory>,
}

impl UserRole {
    pub fn new(role: impl Into<Role>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            role: role.into(),
            directory,
        }
    }
}

impl Condition for UserRole {
    fn plugin_id(&self) -> &str {
        "user_role"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for UserRole {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        let Some(account) = &ctx.account else {
            return false;
        };

        match self.directory.roles_of(account).await {
            Ok(roles) => roles.contains(&self.role),
            Err(e) => {
                tracing::warn!("Role lookup failed for {}: {}", account.id, e);
                false
            }
        }
    }
}

impl QueryFilter for UserRole {
    fn identity_filter(&self, _ctx: &RuleContext) -> IdentityFilter {
        IdentityFilter::has_role(self.role.clone())
    }
}

/// The acting account holds a permission string.
pub struct UserPermission {
    permission: String,
    directory: Arc<dyn AccountDirectory>,
}

impl UserPermission {
    pub fn new(permission: impl Into<String>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            permission: permission.into(),
            directory,
        }
    }
}

impl Condition for UserPermission {
    fn plugin_id(&self) -> &str {
        "user_permission"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for UserPermission {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        let Some(account) = &ctx.account else {
            return false;
        };

        self.directory
            .has_permission(account, &self.permission)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Permission lookup failed for {}: {}", account.id, e);
                false
            })
    }
}

/// The identity being registered is the acting account itself.
/// As a query filter: only the acting account is selectable.
pub struct CurrentUser;

impl Condition for CurrentUser {
    fn plugin_id(&self) -> &str {
        "current_user"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for CurrentUser {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        match (&ctx.account, ctx.target_identity()) {
            (Some(account), Some(identity)) => !account.is_anonymous() && identity == account.identity(),
            _ => false,
        }
    }
}

impl QueryFilter for CurrentUser {
    fn identity_filter(&self, ctx: &RuleContext) -> IdentityFilter {
        IdentityFilter::ids(ctx.account.iter().map(|a| a.id))
    }
}

// =============================================================================
// Registration rules
// =============================================================================

/// The acting account created the registration in context.
pub struct RegistrationOwner;

impl Condition for RegistrationOwner {
    fn plugin_id(&self) -> &str {
        "registration_owner"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for RegistrationOwner {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        let (Some(account), Some(registration)) = (&ctx.account, &ctx.registration) else {
            return false;
        };
        !account.is_anonymous() && registration.owner == Some(account.id)
    }
}

/// The acting account is one of the registration's registrants.
pub struct IsRegistrant;

impl Condition for IsRegistrant {
    fn plugin_id(&self) -> &str {
        "is_registrant"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for IsRegistrant {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        let (Some(account), Some(registration)) = (&ctx.account, &ctx.registration) else {
            return false;
        };
        !account.is_anonymous() && registration.has_registrant(&account.identity())
    }
}

/// The registration in context, or the type requested for a new one, is one
/// of the listed types.
pub struct RegistrationTypeIn {
    types: BTreeSet<String>,
}

impl RegistrationTypeIn {
    pub fn new(types: impl IntoIterator<Item = String>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl Condition for RegistrationTypeIn {
    fn plugin_id(&self) -> &str {
        "registration_type"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        Some(self)
    }
}

#[async_trait]
impl Predicate for RegistrationTypeIn {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        ctx.effective_registration_type()
            .is_some_and(|t| self.types.contains(t))
    }
}
