//! Creation-access chain.
//!
//! An ordered list of checks deciding whether an account may create a
//! registration on an event. Checks share one [`AccessDecision`]; the only way
//! to change it is [`AccessDecision::deny`], so a denied decision can never be
//! approved again by a later check.

use async_trait::async_trait;
use registrar_common::{ANONYMOUS_IDENTITY, AccessResult, AppResult, IdentityRef};
use registrar_rules::context::RuleContext;
use registrar_rules::event::Account;

use crate::constants::checks;
use crate::services::event_meta::EventMeta;

/// Mutable record shared by the checks of one creation-access decision
#[derive(Debug, Clone)]
pub struct AccessDecision {
    registration_type: Option<String>,
    account: Account,
    context: RuleContext,
    denied: bool,
    denied_by: Option<String>,
}

impl AccessDecision {
    pub fn new(registration_type: Option<String>, account: Account, context: RuleContext) -> Self {
        Self {
            registration_type,
            account,
            context,
            denied: false,
            denied_by: None,
        }
    }

    /// Registration type requested, if the caller picked one
    pub fn registration_type(&self) -> Option<&str> {
        self.registration_type.as_deref()
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn context(&self) -> &RuleContext {
        &self.context
    }

    /// Identity being registered; the acting account unless the context names another
    pub fn identity(&self) -> IdentityRef {
        self.context.identity.unwrap_or_else(|| self.account.identity())
    }

    /// Deny access. Only the first denying check is remembered.
    pub fn deny(&mut self, check: &str) {
        if !self.denied {
            self.denied = true;
            self.denied_by = Some(check.to_string());
        }
    }

    pub fn is_denied(&self) -> bool {
        self.denied
    }

    pub fn denied_by(&self) -> Option<&str> {
        self.denied_by.as_deref()
    }

    pub fn result(&self) -> AccessResult {
        if self.denied {
            AccessResult::Forbidden
        } else {
            AccessResult::Allowed
        }
    }
}

/// One step of the creation-access chain
#[async_trait]
pub trait CreateAccessCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()>;
}

// =============================================================================
// Default checks
// =============================================================================

/// A requested registration type must be configured on the event
pub struct RegistrationTypeCheck;

#[async_trait]
impl CreateAccessCheck for RegistrationTypeCheck {
    fn name(&self) -> &str {
        checks::REGISTRATION_TYPE
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        if let Some(registration_type) = decision.registration_type() {
            if !meta.registration_type_is_valid(registration_type) {
                decision.deny(self.name());
            }
        }
        Ok(())
    }
}

/// The event must offer at least one registration type
pub struct TypeAvailabilityCheck;

#[async_trait]
impl CreateAccessCheck for TypeAvailabilityCheck {
    fn name(&self) -> &str {
        checks::TYPE_AVAILABILITY
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        if meta.registration_types().is_empty() {
            decision.deny(self.name());
        }
        Ok(())
    }
}

/// Registration must be switched on for the event
pub struct AcceptingCheck;

#[async_trait]
impl CreateAccessCheck for AcceptingCheck {
    fn name(&self) -> &str {
        checks::ACCEPTING
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        if !meta.is_accepting_registrations() {
            decision.deny(self.name());
        }
        Ok(())
    }
}

/// Without a waitlist at least one place must remain
pub struct CapacityCheck;

#[async_trait]
impl CreateAccessCheck for CapacityCheck {
    fn name(&self) -> &str {
        checks::CAPACITY
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        if meta.allow_wait_list() {
            return Ok(());
        }
        if meta.remaining_capacity().await?.is_below(1) {
            decision.deny(self.name());
        }
        Ok(())
    }
}

/// Registering someone else requires proxy registration on the event
pub struct ProxyCheck;

#[async_trait]
impl CreateAccessCheck for ProxyCheck {
    fn name(&self) -> &str {
        checks::PROXY
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        let identity = decision.identity();
        if identity == decision.account().identity() {
            return Ok(());
        }
        if !meta.can_register_proxy_identities()
            || !meta.proxy_identity_kinds().contains(&identity.kind)
        {
            decision.deny(self.name());
        }
        Ok(())
    }
}

/// An identity may hold one registration per event unless duplicates are allowed
pub struct DuplicateRegistrantCheck;

#[async_trait]
impl CreateAccessCheck for DuplicateRegistrantCheck {
    fn name(&self) -> &str {
        checks::DUPLICATE
    }

    async fn check(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<()> {
        let identity = decision.identity();
        if meta.duplicate_registrants_allowed() || identity.id == ANONYMOUS_IDENTITY {
            return Ok(());
        }
        if meta.identity_registration_count(&identity).await? > 0 {
            decision.deny(self.name());
        }
        Ok(())
    }
}

// =============================================================================
// Chain
// =============================================================================

/// Ordered creation-access checks. Order is list order.
pub struct CreationAccessChain {
    checks: Vec<Box<dyn CreateAccessCheck>>,
}

impl Default for CreationAccessChain {
    fn default() -> Self {
        Self::empty()
            .push(RegistrationTypeCheck)
            .push(TypeAvailabilityCheck)
            .push(AcceptingCheck)
            .push(CapacityCheck)
            .push(ProxyCheck)
            .push(DuplicateRegistrantCheck)
    }
}

impl CreationAccessChain {
    /// A chain without any checks; allows everything
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Append a check after the existing ones
    pub fn push(mut self, check: impl CreateAccessCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run checks in order until one denies
    pub async fn run(&self, meta: &EventMeta, decision: &mut AccessDecision) -> AppResult<AccessResult> {
        for check in &self.checks {
            check.check(meta, decision).await?;
            if decision.is_denied() {
                tracing::debug!(
                    event = %meta.reference(),
                    account = %decision.account().id,
                    check = check.name(),
                    "Registration creation denied"
                );
                break;
            }
        }
        Ok(decision.result())
    }
}
