//! Plugin registry for building rule components from JSON configuration.
//!
//! Conditions and actions are stored as plugin ids plus parameters. The
//! registry maps each id to a factory; an unknown id or bad parameters yield
//! `None`, which callers treat as a rule that grants nothing.

use registrar_common::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::BoxedAction;
use crate::actions::{
    GRANT_OPERATIONS, GrantOperations, Messenger, Recipients, SEND_MESSAGE, SendMessage,
};
use crate::condition::{AllOf, AnyOf, BoxedCondition, Not};
use crate::conditions::{
    CurrentUser, IsRegistrant, RegistrationOwner, RegistrationTypeIn, UserPermission, UserRole,
};
use crate::config::{ActionConfig, ConditionConfig, Params};
use crate::directory::AccountDirectory;
use crate::rule::{CompiledRule, RuleRecord};

/// Factory building a condition from its parameters.
pub type ConditionFactory = Arc<dyn Fn(&Params) -> Option<BoxedCondition> + Send + Sync>;

/// Factory building an action from its configuration.
pub type ActionFactory = Arc<dyn Fn(&ActionConfig) -> Option<BoxedAction> + Send + Sync>;

/// Registry of condition and action plugins.
///
/// # Example
///
/// ```ignore
/// let mut registry = PluginRegistry::new();
/// registry.register_condition("registration_owner", |_| Some(Arc::new(RegistrationOwner)));
///
/// let rule = registry.compile(&record)?;
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    conditions: HashMap<String, ConditionFactory>,
    actions: HashMap<String, ActionFactory>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_condition<F>(&mut self, plugin: impl Into<String>, factory: F)
    where
        F: Fn(&Params) -> Option<BoxedCondition> + Send + Sync + 'static,
    {
        self.conditions.insert(plugin.into(), Arc::new(factory));
    }

    pub fn register_action<F>(&mut self, plugin: impl Into<String>, factory: F)
    where
        F: Fn(&ActionConfig) -> Option<BoxedAction> + Send + Sync + 'static,
    {
        self.actions.insert(plugin.into(), Arc::new(factory));
    }

    pub fn has_condition(&self, plugin: &str) -> bool {
        self.conditions.contains_key(plugin)
    }

    pub fn has_action(&self, plugin: &str) -> bool {
        self.actions.contains_key(plugin)
    }

    /// Build a condition tree from its configuration.
    pub fn build_condition(&self, config: &ConditionConfig) -> Option<BoxedCondition> {
        match config {
            ConditionConfig::Plugin { plugin, params } => {
                self.conditions.get(plugin).and_then(|factory| factory(params))
            }
            ConditionConfig::AllOf { conditions } => {
                let children = self.build_children(conditions)?;
                Some(Arc::new(AllOf::new(children)))
            }
            ConditionConfig::AnyOf { conditions } => {
                let children = self.build_children(conditions)?;
                Some(Arc::new(AnyOf::new(children)))
            }
            ConditionConfig::Not { condition } => {
                let inner = self.build_condition(condition)?;
                Some(Arc::new(Not(inner)))
            }
        }
    }

    fn build_children(&self, configs: &[ConditionConfig]) -> Option<Vec<BoxedCondition>> {
        if configs.is_empty() {
            return None;
        }
        configs.iter().map(|c| self.build_condition(c)).collect()
    }

    /// Build an action from its configuration.
    pub fn build_action(&self, config: &ActionConfig) -> Option<BoxedAction> {
        self.actions
            .get(&config.plugin)
            .and_then(|factory| factory(config))
    }

    /// Resolve every component of a stored rule.
    pub fn compile(&self, record: &RuleRecord) -> AppResult<CompiledRule> {
        let mut conditions = Vec::with_capacity(record.conditions.len());
        for condition in &record.conditions {
            let built = self.build_condition(&condition.config).ok_or_else(|| {
                AppError::PluginResolution(format!(
                    "condition {} of rule {}: {}",
                    condition.id,
                    record.id,
                    describe_condition(&condition.config)
                ))
            })?;
            conditions.push(built);
        }

        let mut actions = Vec::with_capacity(record.actions.len());
        for action in &record.actions {
            let built = self.build_action(&action.config).ok_or_else(|| {
                AppError::PluginResolution(format!(
                    "action {} of rule {}: {}",
                    action.id, record.id, action.config.plugin
                ))
            })?;
            actions.push(built);
        }

        Ok(CompiledRule {
            record: record.clone(),
            conditions,
            actions,
        })
    }

    /// Validate a condition configuration without keeping the result.
    ///
    /// Returns every problem found, not just the first.
    pub fn validate_condition(&self, config: &ConditionConfig) -> Vec<String> {
        let mut errors = Vec::new();
        self.validate_recursive(config, &mut errors);
        errors
    }

    fn validate_recursive(&self, config: &ConditionConfig, errors: &mut Vec<String>) {
        match config {
            ConditionConfig::Plugin { plugin, params } => {
                if !self.has_condition(plugin) {
                    errors.push(format!("Unknown condition plugin: {}", plugin));
                } else if self.build_condition(config).is_none() {
                    errors.push(format!(
                        "Invalid parameters for condition '{}': {:?}",
                        plugin, params
                    ));
                }
            }
            ConditionConfig::AllOf { conditions } | ConditionConfig::AnyOf { conditions } => {
                if conditions.is_empty() {
                    errors.push("Empty all_of/any_of condition list".to_string());
                }
                for condition in conditions {
                    self.validate_recursive(condition, errors);
                }
            }
            ConditionConfig::Not { condition } => {
                self.validate_recursive(condition, errors);
            }
        }
    }

    /// Validate an action configuration.
    pub fn validate_action(&self, config: &ActionConfig) -> Vec<String> {
        if !self.has_action(&config.plugin) {
            vec![format!("Unknown action plugin: {}", config.plugin)]
        } else if self.build_action(config).is_none() {
            vec![format!(
                "Invalid parameters for action '{}': {:?}",
                config.plugin, config.params
            )]
        } else {
            Vec::new()
        }
    }
}

fn describe_condition(config: &ConditionConfig) -> String {
    match config {
        ConditionConfig::Plugin { plugin, .. } => plugin.clone(),
        ConditionConfig::AllOf { .. } => "all_of".to_string(),
        ConditionConfig::AnyOf { .. } => "any_of".to_string(),
        ConditionConfig::Not { .. } => "not".to_string(),
    }
}

// =============================================================================
// Built-in plugins
// =============================================================================

/// Create a registry holding every built-in condition and action.
pub fn builtin_registry(
    directory: Arc<dyn AccountDirectory>,
    messenger: Arc<dyn Messenger>,
) -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    let roles = directory.clone();
    registry.register_condition("user_role", move |params| {
        let role = params.get("role")?.as_str()?;
        Some(Arc::new(UserRole::new(role, roles.clone())))
    });

    let permissions = directory;
    registry.register_condition("user_permission", move |params| {
        let permission = params.get("permission")?.as_str()?;
        Some(Arc::new(UserPermission::new(permission, permissions.clone())))
    });

    registry.register_condition("current_user", |_| Some(Arc::new(CurrentUser)));
    registry.register_condition("registration_owner", |_| Some(Arc::new(RegistrationOwner)));
    registry.register_condition("is_registrant", |_| Some(Arc::new(IsRegistrant)));

    registry.register_condition("registration_type", |params| {
        let types = params
            .get("types")?
            .as_array()?
            .iter()
            .map(|t| t.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        Some(Arc::new(RegistrationTypeIn::new(types)))
    });

    registry.register_action(GRANT_OPERATIONS, |config| {
        if config.operations.is_empty() {
            return None;
        }
        Some(Arc::new(GrantOperations::new(config.operations.clone())))
    });

    registry.register_action(SEND_MESSAGE, move |config| {
        let template = config.params.get("template")?.as_str()?;
        let recipients: Recipients = match config.params.get("recipients") {
            Some(value) => serde_json::from_value(value.clone()).ok()?,
            None => Recipients::Registrants,
        };
        Some(Arc::new(SendMessage::new(
            template,
            recipients,
            messenger.clone(),
        )))
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TracingMessenger;
    use crate::config::{RuleDefinition, params};
    use crate::event::Account;
    use async_trait::async_trait;
    use registrar_common::{EventRef, Grants, Operation, Role};
    use serde_json::json;
    use std::collections::BTreeSet;

    struct NoDirectory;

    #[async_trait]
    impl AccountDirectory for NoDirectory {
        async fn has_permission(&self, _account: &Account, _permission: &str) -> AppResult<bool> {
            Ok(false)
        }

        async fn roles_of(&self, _account: &Account) -> AppResult<BTreeSet<Role>> {
            Ok(BTreeSet::new())
        }

        async fn roles(&self) -> AppResult<Vec<Role>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> PluginRegistry {
        builtin_registry(Arc::new(NoDirectory), Arc::new(TracingMessenger))
    }

    #[test]
    fn test_builtin_registry_contents() {
        let registry = registry();

        assert!(registry.has_condition("user_role"));
        assert!(registry.has_condition("registration_owner"));
        assert!(registry.has_action("grant_operations"));
        assert!(registry.has_action("send_message"));
        assert!(!registry.has_condition("NonExistent"));
    }

    #[test]
    fn test_build_condition_with_params() {
        let registry = registry();

        let ok = ConditionConfig::plugin_with_params("user_role", params([("role", json!("staff"))]));
        let built = registry.build_condition(&ok).unwrap();
        assert!(built.as_predicate().is_some());
        assert!(built.as_query_filter().is_some());

        let bad = ConditionConfig::plugin_with_params("user_role", params([("wrong", json!(1))]));
        assert!(registry.build_condition(&bad).is_none());
    }

    #[test]
    fn test_build_composite() {
        let registry = registry();

        let config = ConditionConfig::all_of(vec![
            ConditionConfig::plugin("registration_owner"),
            ConditionConfig::not(ConditionConfig::plugin("is_registrant")),
        ]);
        assert!(registry.build_condition(&config).is_some());

        let empty = ConditionConfig::any_of(vec![]);
        assert!(registry.build_condition(&empty).is_none());

        let unknown_child = ConditionConfig::all_of(vec![ConditionConfig::plugin("missing")]);
        assert!(registry.build_condition(&unknown_child).is_none());
    }

    #[test]
    fn test_compile_rule() {
        let registry = registry();
        let event = EventRef::new("meetup", uuid::Uuid::new_v4());

        let definition = RuleDefinition::new("register")
            .condition(ConditionConfig::plugin("registration_owner"))
            .action(ActionConfig::grant([Operation::View, Operation::Update]));
        let record = RuleRecord::from_definition(event.clone(), definition, true);

        let compiled = registry.compile(&record).unwrap();
        assert_eq!(compiled.conditions.len(), 1);
        assert_eq!(
            compiled.grants(),
            Grants::from([Operation::View, Operation::Update])
        );

        let broken = RuleDefinition::new("register")
            .action(ActionConfig::new("launch_rockets", Params::new()));
        let record = RuleRecord::from_definition(event, broken, false);
        let err = registry.compile(&record).unwrap_err();
        assert_eq!(err.error_code(), "PLUGIN_RESOLUTION_FAILURE");
    }

    #[test]
    fn test_send_message_params() {
        let registry = registry();

        let ok = ActionConfig::new(
            "send_message",
            params([("template", json!("reminder")), ("recipients", json!("all_registrants"))]),
        );
        assert!(registry.build_action(&ok).is_some());

        let bad_recipients = ActionConfig::new(
            "send_message",
            params([("template", json!("reminder")), ("recipients", json!("everyone"))]),
        );
        assert!(registry.build_action(&bad_recipients).is_none());

        let empty_grant = ActionConfig::new("grant_operations", Params::new());
        assert!(registry.build_action(&empty_grant).is_none());
    }

    #[test]
    fn test_validate() {
        let registry = registry();

        let config = ConditionConfig::all_of(vec![
            ConditionConfig::plugin("current_user"),
            ConditionConfig::plugin("unknown_plugin"),
            ConditionConfig::plugin("user_permission"),
        ]);
        let errors = registry.validate_condition(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Unknown condition plugin"));
        assert!(errors[1].contains("Invalid parameters"));

        let errors = registry.validate_action(&ActionConfig::grant([Operation::Create]));
        assert!(errors.is_empty());

        let errors = registry.validate_action(&ActionConfig::new("nope", Params::new()));
        assert!(errors[0].contains("Unknown action plugin"));
    }
}
