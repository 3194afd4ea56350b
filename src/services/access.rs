//! Registration access facade.
//!
//! Entry point for controllers and forms: create access, per-operation
//! access, proxy candidate listing and trigger firing.

use registrar_common::{AccessResult, AppResult, EventRef, IdentityRef, Operation};
use registrar_rules::context::RuleContext;
use registrar_rules::directory::AccountDirectory;
use registrar_rules::evaluator::{FireReport, RuleEvaluator};
use registrar_rules::event::{Account, IdentityRecord, Registration};
use registrar_rules::query::IdentityQuery;
use registrar_rules::registry::PluginRegistry;
use registrar_rules::store::RuleStore;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::RegistrationStore;
use crate::services::access_chain::{AccessDecision, CreateAccessCheck, CreationAccessChain};
use crate::services::candidate_query::CandidateQueryBuilder;
use crate::services::event_meta::EventMeta;

/// What the caller knows about a registration about to be created
#[derive(Debug, Clone, Default)]
pub struct CreateAccessRequest {
    pub registration_type: Option<String>,
    /// Identity being registered; the acting account when unset
    pub identity: Option<IdentityRef>,
    /// Draft of the registration, when the form already built one
    pub registration: Option<Registration>,
}

impl CreateAccessRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, registration_type: impl Into<String>) -> Self {
        self.registration_type = Some(registration_type.into());
        self
    }

    pub fn for_identity(mut self, identity: IdentityRef) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registration = Some(registration);
        self
    }
}

/// Registration access decisions for one set of stores.
pub struct RegistrationAccess {
    store: Arc<dyn RegistrationStore>,
    rules: Arc<dyn RuleStore>,
    evaluator: Arc<RuleEvaluator>,
    chain: CreationAccessChain,
    candidates: CandidateQueryBuilder,
    register_trigger: String,
}

impl RegistrationAccess {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        rules: Arc<dyn RuleStore>,
        directory: Arc<dyn AccountDirectory>,
        registry: Arc<PluginRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let evaluator = Arc::new(RuleEvaluator::new(rules.clone(), registry));
        let candidates =
            CandidateQueryBuilder::new(evaluator.clone(), directory, &config.register_trigger)
                .with_scope(config.proxy_rule_scope);

        Self {
            store,
            rules,
            evaluator,
            chain: CreationAccessChain::default(),
            candidates,
            register_trigger: config.register_trigger.clone(),
        }
    }

    /// Append a site-specific check after the default creation-access checks
    pub fn push_check(mut self, check: impl CreateAccessCheck + 'static) -> Self {
        self.chain = self.chain.push(check);
        self
    }

    /// Names of the creation-access checks, in run order
    pub fn check_names(&self) -> Vec<&str> {
        self.chain.check_names()
    }

    pub fn evaluator(&self) -> &Arc<RuleEvaluator> {
        &self.evaluator
    }

    pub async fn event_meta(&self, event: &EventRef) -> AppResult<EventMeta> {
        EventMeta::load(self.store.clone(), self.rules.clone(), event).await
    }

    /// May `account` create a registration on the event?
    ///
    /// Allowed only when the creation-access chain passes and at least one
    /// rule grants `create`.
    pub async fn decide_create_access(
        &self,
        event: &EventRef,
        account: &Account,
        request: &CreateAccessRequest,
    ) -> AppResult<AccessResult> {
        let meta = self.event_meta(event).await?;

        let mut ctx = RuleContext::new(meta.event().clone()).with_account(account.clone());
        if let Some(identity) = request.identity {
            ctx = ctx.with_identity(identity);
        }
        if let Some(registration) = &request.registration {
            ctx = ctx.with_registration(registration.clone());
        }
        if let Some(registration_type) = &request.registration_type {
            ctx = ctx.with_registration_type(registration_type.clone());
        }

        let mut decision =
            AccessDecision::new(request.registration_type.clone(), account.clone(), ctx);
        if self.chain.run(&meta, &mut decision).await? == AccessResult::Forbidden {
            return Ok(AccessResult::Forbidden);
        }

        let grants = self
            .evaluator
            .evaluate_grants(&self.register_trigger, decision.context())
            .await?;

        Ok(if grants.contains(&Operation::Create) {
            AccessResult::Allowed
        } else {
            tracing::debug!(event = %event, account = %account.id, "No rule grants create");
            AccessResult::Forbidden
        })
    }

    /// May `account` perform `operation` on an existing registration?
    ///
    /// Returns `Neutral` rather than `Forbidden` when no rule grants it, so
    /// other access layers can still allow the operation.
    pub async fn decide_operation_access(
        &self,
        registration: &Registration,
        operation: Operation,
        account: &Account,
    ) -> AppResult<AccessResult> {
        let meta = self.event_meta(&registration.event).await?;
        let ctx = RuleContext::new(meta.event().clone())
            .with_registration(registration.clone())
            .with_account(account.clone());

        let grants = self
            .evaluator
            .evaluate_grants(&self.register_trigger, &ctx)
            .await?;

        Ok(if grants.contains(&operation) {
            AccessResult::Allowed
        } else {
            AccessResult::Neutral
        })
    }

    /// Query of identities `account` may register on the event
    pub async fn eligible_proxy_identities(
        &self,
        event: &EventRef,
        account: &Account,
    ) -> AppResult<IdentityQuery> {
        let meta = self.event_meta(event).await?;
        self.candidates.build(&meta, account).await
    }

    /// Run the candidate query against the registration store
    pub async fn list_eligible_identities(
        &self,
        event: &EventRef,
        account: &Account,
    ) -> AppResult<Vec<IdentityRecord>> {
        let query = self.eligible_proxy_identities(event, account).await?;
        self.store.find_identities(&query).await
    }

    /// Fire a trigger; any failed rule surfaces as a trigger execution error
    pub async fn fire_trigger(&self, trigger: &str, ctx: &RuleContext) -> AppResult<FireReport> {
        let report = self.evaluator.fire(trigger, ctx).await?.into_result()?;
        tracing::info!(
            event = %ctx.event.reference,
            trigger,
            rules = report.rules_matched,
            actions = report.actions_executed,
            "Trigger fired"
        );
        Ok(report)
    }
}
