//! Rule engine for event registration.
//!
//! Rules are attached to events and keyed by a trigger name. Each rule holds
//! an ordered list of conditions and actions, stored as plugin ids with JSON
//! parameters and resolved through a [`registry::PluginRegistry`].
//!
//! # Example
//!
//! ```ignore
//! use registrar_rules::prelude::*;
//!
//! let registry = builtin_registry(directory, Arc::new(TracingMessenger));
//! let evaluator = RuleEvaluator::new(rule_store, Arc::new(registry));
//!
//! let ctx = RuleContext::new(event).with_registration(registration).with_account(account);
//! let grants = evaluator.evaluate_grants("register", &ctx).await?;
//! ```
//!
//! Conditions carry up to two capabilities: a boolean predicate over a
//! [`context::RuleContext`], and a filter that narrows an identity query.
//! A rule evaluated in one mode ignores conditions lacking that capability.

pub mod action;
pub mod actions;
pub mod condition;
pub mod conditions;
pub mod config;
pub mod context;
pub mod directory;
pub mod evaluator;
pub mod event;
pub mod query;
pub mod registry;
pub mod rule;
pub mod store;

/// Prelude module - import everything you need with `use registrar_rules::prelude::*`
pub mod prelude {
    pub use crate::action::{Action, BoxedAction};
    pub use crate::actions::{
        GrantOperations, Messenger, OutgoingMessage, Recipients, SendMessage, TracingMessenger,
    };
    pub use crate::condition::{AllOf, AnyOf, BoxedCondition, Condition, Not, Predicate, QueryFilter};
    pub use crate::conditions::*;
    pub use crate::config::{ActionConfig, ConditionConfig, Params, RuleDefinition};
    pub use crate::context::RuleContext;
    pub use crate::directory::AccountDirectory;
    pub use crate::evaluator::{FireReport, RuleEvaluator};
    pub use crate::event::{
        Account, Event, EventSettings, IdentityRecord, ProxyPolicy, Registrant, Registration,
        RegistrationType,
    };
    pub use crate::query::{IdentityFilter, IdentityQuery};
    pub use crate::registry::{PluginRegistry, builtin_registry};
    pub use crate::rule::{CompiledRule, RuleRecord, RuleScope};
    pub use crate::store::RuleStore;
}
