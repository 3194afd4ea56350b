//! JSON configuration for rule components.
//!
//! Rules are stored as plugin ids plus parameter blobs so event managers can
//! author them without code changes. The registry turns them into live
//! conditions and actions.

use registrar_common::{Grants, Operation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plugin parameters. Ordered so serialized rules compare byte-for-byte.
pub type Params = BTreeMap<String, serde_json::Value>;

/// JSON representation of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// A single condition plugin
    Plugin {
        plugin: String,
        #[serde(default)]
        params: Params,
    },
    /// Every condition must hold
    AllOf { conditions: Vec<ConditionConfig> },
    /// At least one condition must hold
    AnyOf { conditions: Vec<ConditionConfig> },
    /// Negation of a condition
    Not { condition: Box<ConditionConfig> },
}

impl ConditionConfig {
    /// Create a plugin condition without parameters
    pub fn plugin(plugin: impl Into<String>) -> Self {
        ConditionConfig::Plugin {
            plugin: plugin.into(),
            params: Params::new(),
        }
    }

    /// Create a plugin condition with parameters
    pub fn plugin_with_params(plugin: impl Into<String>, params: Params) -> Self {
        ConditionConfig::Plugin {
            plugin: plugin.into(),
            params,
        }
    }

    pub fn all_of(conditions: Vec<ConditionConfig>) -> Self {
        ConditionConfig::AllOf { conditions }
    }

    pub fn any_of(conditions: Vec<ConditionConfig>) -> Self {
        ConditionConfig::AnyOf { conditions }
    }

    pub fn not(condition: ConditionConfig) -> Self {
        ConditionConfig::Not {
            condition: Box::new(condition),
        }
    }
}

/// JSON representation of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub plugin: String,
    #[serde(default)]
    pub params: Params,
    /// Operations this action grants when its rule passes
    #[serde(default, skip_serializing_if = "Grants::is_empty")]
    pub operations: Grants,
}

impl ActionConfig {
    pub fn new(plugin: impl Into<String>, params: Params) -> Self {
        Self {
            plugin: plugin.into(),
            params,
            operations: Grants::new(),
        }
    }

    /// An operation-grant action
    pub fn grant(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            plugin: crate::actions::GRANT_OPERATIONS.to_string(),
            params: Params::new(),
            operations: operations.into_iter().collect(),
        }
    }
}

/// A rule without storage identity, as shipped by an event type or authored
/// by an event manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub trigger: String,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl RuleDefinition {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn condition(mut self, condition: ConditionConfig) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn action(mut self, action: ActionConfig) -> Self {
        self.actions.push(action);
        self
    }
}

/// Build parameters from key/value pairs.
pub fn params<K, I>(pairs: I) -> Params
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_config_serialization() {
        let condition = ConditionConfig::any_of(vec![
            ConditionConfig::plugin_with_params("user_role", params([("role", json!("staff"))])),
            ConditionConfig::not(ConditionConfig::plugin("registration_owner")),
        ]);

        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "any_of");
        assert_eq!(json["conditions"][0]["plugin"], "user_role");
        assert_eq!(json["conditions"][1]["type"], "not");

        let parsed: ConditionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, condition);
    }

    #[test]
    fn test_rule_definition_from_json() {
        let raw = r#"{
            "trigger": "register",
            "conditions": [{"type": "plugin", "plugin": "user_role", "params": {"role": "member"}}],
            "actions": [{"plugin": "grant_operations", "operations": ["create", "view"]}]
        }"#;

        let rule: RuleDefinition = serde_json::from_str(raw).unwrap();
        assert_eq!(rule.trigger, "register");
        assert_eq!(rule.conditions.len(), 1);
        assert!(rule.actions[0].operations.contains(&Operation::Create));
        assert!(rule.actions[0].operations.contains(&Operation::View));
    }

    #[test]
    fn test_grant_action_builder() {
        let action = ActionConfig::grant([Operation::Update]);
        assert_eq!(action.plugin, "grant_operations");
        assert_eq!(action.operations.len(), 1);
    }
}
