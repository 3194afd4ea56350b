//! Candidate-selection query builder.
//!
//! Builds the identity query listing who an account may add as a registrant.
//! The same rules that grant `create` decide who can be offered, so a
//! selection widget never lists an identity the access layer would reject.

use registrar_common::{
    ANONYMOUS_IDENTITY, AUTHENTICATED_ROLE, AppResult, IdentityKind, Operation,
    PERMISSION_REGISTER_SELF, register_role_permission,
};
use registrar_rules::context::RuleContext;
use registrar_rules::directory::AccountDirectory;
use registrar_rules::evaluator::RuleEvaluator;
use registrar_rules::event::Account;
use registrar_rules::query::{IdentityFilter, IdentityQuery};
use registrar_rules::rule::RuleScope;
use std::sync::Arc;

use crate::services::event_meta::EventMeta;

pub struct CandidateQueryBuilder {
    evaluator: Arc<RuleEvaluator>,
    directory: Arc<dyn AccountDirectory>,
    trigger: String,
    scope: RuleScope,
}

impl CandidateQueryBuilder {
    pub fn new(
        evaluator: Arc<RuleEvaluator>,
        directory: Arc<dyn AccountDirectory>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            directory,
            trigger: trigger.into(),
            scope: RuleScope::All,
        }
    }

    /// Restrict which rules feed the selection
    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    /// Build the query of identities `account` may register on the event.
    pub async fn build(&self, meta: &EventMeta, account: &Account) -> AppResult<IdentityQuery> {
        let mut query = IdentityQuery::new(IdentityKind::User);
        query.filter(IdentityFilter::not_ids([ANONYMOUS_IDENTITY]));

        if !meta.duplicate_registrants_allowed() {
            let registered = meta
                .registrants()
                .await?
                .into_iter()
                .filter(|r| r.identity.kind == IdentityKind::User)
                .map(|r| r.identity.id);
            query.filter(IdentityFilter::not_ids(registered));
        }

        let filters = self.rule_filters(meta, account).await?;
        if filters.is_empty() {
            tracing::debug!(
                event = %meta.reference(),
                trigger = %self.trigger,
                "No query-filtering conditions grant create; no candidates"
            );
            query.force_empty();
            return Ok(query);
        }
        for filter in filters {
            query.filter(filter);
        }

        match self.proxy_scope(account).await? {
            ProxyScope::Unrestricted => {}
            ProxyScope::Restricted(scope) => {
                query.filter(IdentityFilter::Any { filters: scope });
            }
            ProxyScope::Nothing => {
                query.force_empty();
            }
        }

        Ok(query)
    }

    /// Filters of the query-filtering conditions of every rule granting create
    async fn rule_filters(
        &self,
        meta: &EventMeta,
        account: &Account,
    ) -> AppResult<Vec<IdentityFilter>> {
        let ctx = RuleContext::new(meta.event().clone()).with_account(account.clone());
        let rules = self
            .evaluator
            .compiled_rules(&ctx, &self.trigger, self.scope)
            .await?;

        let mut filters = Vec::new();
        for rule in rules.iter().filter(|r| r.grants().contains(&Operation::Create)) {
            for condition in &rule.conditions {
                if let Some(filter) = condition.as_query_filter() {
                    filters.push(filter.identity_filter(&ctx));
                }
            }
        }
        Ok(filters)
    }

    /// Union of the identity sets the account's registration permissions cover
    async fn proxy_scope(&self, account: &Account) -> AppResult<ProxyScope> {
        let blanket = register_role_permission(AUTHENTICATED_ROLE);
        if self.directory.has_permission(account, &blanket).await? {
            return Ok(ProxyScope::Unrestricted);
        }

        let mut scope = Vec::new();
        if self
            .directory
            .has_permission(account, PERMISSION_REGISTER_SELF)
            .await?
        {
            scope.push(IdentityFilter::ids([account.id]));
        }

        for role in self.directory.roles().await? {
            if role == AUTHENTICATED_ROLE {
                continue;
            }
            if self
                .directory
                .has_permission(account, &register_role_permission(&role))
                .await?
            {
                scope.push(IdentityFilter::has_role(role));
            }
        }

        Ok(if scope.is_empty() {
            ProxyScope::Nothing
        } else {
            ProxyScope::Restricted(scope)
        })
    }
}

enum ProxyScope {
    Unrestricted,
    Restricted(Vec<IdentityFilter>),
    Nothing,
}
