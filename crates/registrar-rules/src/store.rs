//! Rule storage seam.

use async_trait::async_trait;
use registrar_common::{AppResult, ComponentId, EventRef};

use crate::config::RuleDefinition;
use crate::rule::{RuleRecord, RuleScope};

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Rules attached to the event for a trigger, in attachment order
    async fn load_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        scope: RuleScope,
    ) -> AppResult<Vec<RuleRecord>>;

    /// The rule owning a condition or action
    async fn find_rule_by_component(&self, component: ComponentId)
    -> AppResult<Option<RuleRecord>>;

    /// Replace every rule for the trigger with the given definitions
    async fn replace_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        definitions: &[RuleDefinition],
        is_default: bool,
    ) -> AppResult<Vec<RuleRecord>>;

    /// Attach one more rule after the existing ones
    async fn append_rule(
        &self,
        event: &EventRef,
        definition: &RuleDefinition,
        is_default: bool,
    ) -> AppResult<RuleRecord>;
}
