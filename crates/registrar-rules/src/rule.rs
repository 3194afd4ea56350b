//! Stored rules and their compiled form.

use registrar_common::{ComponentId, EventRef, Grants, RuleId};
use serde::{Deserialize, Serialize};

use crate::action::BoxedAction;
use crate::condition::BoxedCondition;
use crate::config::{ActionConfig, ConditionConfig, RuleDefinition};

/// Which rules to load for a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    All,
    /// Only rules installed from the event-type defaults
    DefaultOnly,
    /// Only rules authored by event managers
    CustomOnly,
}

impl RuleScope {
    pub fn includes(&self, is_default: bool) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::DefaultOnly => is_default,
            RuleScope::CustomOnly => !is_default,
        }
    }
}

impl std::str::FromStr for RuleScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(RuleScope::All),
            "default_only" => Ok(RuleScope::DefaultOnly),
            "custom_only" => Ok(RuleScope::CustomOnly),
            other => Err(format!("unknown rule scope: {other}")),
        }
    }
}

/// A stored condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub id: ComponentId,
    pub config: ConditionConfig,
}

/// A stored action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ComponentId,
    pub config: ActionConfig,
}

/// A rule attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: RuleId,
    pub event: EventRef,
    pub trigger: String,
    pub is_default: bool,
    pub conditions: Vec<ConditionRecord>,
    pub actions: Vec<ActionRecord>,
}

impl RuleRecord {
    /// Give a definition storage identity
    pub fn from_definition(event: EventRef, definition: RuleDefinition, is_default: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            event,
            trigger: definition.trigger,
            is_default,
            conditions: definition
                .conditions
                .into_iter()
                .map(|config| ConditionRecord {
                    id: uuid::Uuid::new_v4(),
                    config,
                })
                .collect(),
            actions: definition
                .actions
                .into_iter()
                .map(|config| ActionRecord {
                    id: uuid::Uuid::new_v4(),
                    config,
                })
                .collect(),
        }
    }

    /// The rule without storage identity
    pub fn definition(&self) -> RuleDefinition {
        RuleDefinition {
            trigger: self.trigger.clone(),
            conditions: self.conditions.iter().map(|c| c.config.clone()).collect(),
            actions: self.actions.iter().map(|a| a.config.clone()).collect(),
        }
    }

    pub fn has_component(&self, component: ComponentId) -> bool {
        self.conditions.iter().any(|c| c.id == component)
            || self.actions.iter().any(|a| a.id == component)
    }
}

/// A rule whose components all resolved to plugins
pub struct CompiledRule {
    pub record: RuleRecord,
    pub conditions: Vec<BoxedCondition>,
    pub actions: Vec<BoxedAction>,
}

impl CompiledRule {
    /// Union of the operations granted by the rule's actions
    pub fn grants(&self) -> Grants {
        self.actions
            .iter()
            .flat_map(|action| action.granted_operations().iter().copied())
            .collect()
    }
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.record.id)
            .field("trigger", &self.record.trigger)
            .field("conditions", &self.conditions.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_common::Operation;

    #[test]
    fn test_definition_roundtrip_keeps_order() {
        let definition = RuleDefinition::new("register")
            .condition(ConditionConfig::plugin("registration_owner"))
            .condition(ConditionConfig::plugin("user_role"))
            .action(ActionConfig::grant([Operation::View]));

        let event = EventRef::new("meetup", uuid::Uuid::new_v4());
        let record = RuleRecord::from_definition(event, definition.clone(), true);

        assert!(record.is_default);
        assert_eq!(record.definition(), definition);
        assert!(record.has_component(record.actions[0].id));
        assert!(!record.has_component(uuid::Uuid::new_v4()));
    }

    #[test]
    fn test_rule_scope() {
        assert!(RuleScope::All.includes(true));
        assert!(RuleScope::All.includes(false));
        assert!(RuleScope::DefaultOnly.includes(true));
        assert!(!RuleScope::DefaultOnly.includes(false));
        assert!(RuleScope::CustomOnly.includes(false));
        assert_eq!("default_only".parse(), Ok(RuleScope::DefaultOnly));
        assert!("some".parse::<RuleScope>().is_err());
    }
}
