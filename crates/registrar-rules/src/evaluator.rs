//! Rule evaluation: operation grants and trigger firing.

use registrar_common::{AppError, AppResult, Grants, RuleId};
use std::sync::Arc;

use crate::context::RuleContext;
use crate::registry::PluginRegistry;
use crate::rule::{CompiledRule, RuleScope};
use crate::store::RuleStore;

/// Outcome of firing a trigger.
#[derive(Debug, Default)]
pub struct FireReport {
    /// Rules whose conditions passed
    pub rules_matched: usize,
    /// Actions that ran to completion
    pub actions_executed: usize,
    /// Rules whose actions stopped on an error
    pub failures: Vec<(RuleId, AppError)>,
}

impl FireReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn recorded failures into a `TriggerExecution` error.
    pub fn into_result(self) -> AppResult<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        let message = self
            .failures
            .iter()
            .map(|(rule, error)| format!("rule {rule}: {error}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::TriggerExecution(message))
    }
}

/// Selects the rules attached to an event for a trigger and evaluates them.
///
/// Rules are taken in attachment order. Every matching rule contributes; there
/// is no first-match short-circuit between rules.
pub struct RuleEvaluator {
    rules: Arc<dyn RuleStore>,
    registry: Arc<PluginRegistry>,
}

impl RuleEvaluator {
    pub fn new(rules: Arc<dyn RuleStore>, registry: Arc<PluginRegistry>) -> Self {
        Self { rules, registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    /// Load the event's rules for a trigger and resolve their plugins.
    ///
    /// A rule with any unresolvable component is left out, so it grants and
    /// fires nothing.
    pub async fn compiled_rules(
        &self,
        ctx: &RuleContext,
        trigger: &str,
        scope: RuleScope,
    ) -> AppResult<Vec<CompiledRule>> {
        let records = self
            .rules
            .load_rules(&ctx.event.reference, trigger, scope)
            .await?;

        let mut compiled = Vec::with_capacity(records.len());
        for record in &records {
            match self.registry.compile(record) {
                Ok(rule) => compiled.push(rule),
                Err(e) => {
                    tracing::warn!(
                        event = %ctx.event.reference,
                        trigger,
                        "Skipping rule {}: {}",
                        record.id,
                        e
                    );
                }
            }
        }
        Ok(compiled)
    }

    /// Evaluate the rule's boolean conditions in order.
    ///
    /// A rule without conditions passes. Conditions lacking the boolean
    /// capability are skipped.
    pub async fn conditions_pass(rule: &CompiledRule, ctx: &RuleContext) -> bool {
        for condition in &rule.conditions {
            let Some(predicate) = condition.as_predicate() else {
                continue;
            };
            if !predicate.is_satisfied_by(ctx).await {
                return false;
            }
        }
        true
    }

    /// Union of the operations granted by every passing rule.
    pub async fn evaluate_grants(&self, trigger: &str, ctx: &RuleContext) -> AppResult<Grants> {
        self.evaluate_grants_in_scope(trigger, RuleScope::All, ctx)
            .await
    }

    pub async fn evaluate_grants_in_scope(
        &self,
        trigger: &str,
        scope: RuleScope,
        ctx: &RuleContext,
    ) -> AppResult<Grants> {
        let mut grants = Grants::new();
        for rule in self.compiled_rules(ctx, trigger, scope).await? {
            if Self::conditions_pass(&rule, ctx).await {
                grants.extend(rule.grants());
            }
        }

        tracing::debug!(
            event = %ctx.event.reference,
            trigger,
            ?grants,
            "Evaluated rule grants"
        );
        Ok(grants)
    }

    /// Execute the actions of every passing rule.
    ///
    /// A failing action stops the remaining actions of its rule; other rules
    /// still run. Failures are collected in the report.
    pub async fn fire(&self, trigger: &str, ctx: &RuleContext) -> AppResult<FireReport> {
        let mut report = FireReport::default();

        for rule in self.compiled_rules(ctx, trigger, RuleScope::All).await? {
            if !Self::conditions_pass(&rule, ctx).await {
                continue;
            }
            report.rules_matched += 1;

            match self.execute_actions(&rule, ctx).await {
                Ok(executed) => report.actions_executed += executed,
                Err((executed, error)) => {
                    tracing::error!(
                        event = %ctx.event.reference,
                        trigger,
                        "Rule {} failed: {}",
                        rule.record.id,
                        error
                    );
                    report.actions_executed += executed;
                    report.failures.push((rule.record.id, error));
                }
            }
        }

        Ok(report)
    }

    /// Run every action of a rule in order, stopping at the first error.
    ///
    /// On error, returns how many actions completed along with the error.
    pub async fn execute_actions(
        &self,
        rule: &CompiledRule,
        ctx: &RuleContext,
    ) -> Result<usize, (usize, AppError)> {
        let mut executed = 0;
        for action in &rule.actions {
            if let Err(error) = action.execute(ctx).await {
                return Err((executed, error));
            }
            executed += 1;
        }
        Ok(executed)
    }
}
