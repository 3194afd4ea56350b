//! Condition capabilities and combinators.
//!
//! A condition declares which capabilities it has. Boolean conditions decide
//! whether a rule passes for a context; query-filtering conditions narrow the
//! candidate-selection query. Callers probe with [`Condition::as_predicate`]
//! and [`Condition::as_query_filter`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::RuleContext;
use crate::query::IdentityFilter;

/// Boolean capability: evaluate against a context.
#[async_trait]
pub trait Predicate: Send + Sync {
    /// Check if the predicate holds for the given context.
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool;
}

/// Query-filtering capability: narrow the identities a proxy may register.
pub trait QueryFilter: Send + Sync {
    fn identity_filter(&self, ctx: &RuleContext) -> IdentityFilter;
}

/// A rule condition built from a plugin id and its configuration.
pub trait Condition: Send + Sync {
    fn plugin_id(&self) -> &str;

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        None
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        None
    }
}

/// A shared condition for dynamic dispatch.
pub type BoxedCondition = Arc<dyn Condition>;

/// Every child condition must hold.
pub struct AllOf {
    conditions: Vec<BoxedCondition>,
}

impl AllOf {
    pub fn new(conditions: Vec<BoxedCondition>) -> Self {
        AllOf { conditions }
    }
}

impl Condition for AllOf {
    fn plugin_id(&self) -> &str {
        "all_of"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        self.conditions
            .iter()
            .all(|c| c.as_predicate().is_some())
            .then_some(self as &dyn Predicate)
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        self.conditions
            .iter()
            .all(|c| c.as_query_filter().is_some())
            .then_some(self as &dyn QueryFilter)
    }
}

#[async_trait]
impl Predicate for AllOf {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        for condition in &self.conditions {
            match condition.as_predicate() {
                Some(predicate) if predicate.is_satisfied_by(ctx).await => {}
                _ => return false,
            }
        }
        true
    }
}

impl QueryFilter for AllOf {
    fn identity_filter(&self, ctx: &RuleContext) -> IdentityFilter {
        IdentityFilter::All {
            filters: self
                .conditions
                .iter()
                .filter_map(|c| c.as_query_filter())
                .map(|f| f.identity_filter(ctx))
                .collect(),
        }
    }
}

/// At least one child condition must hold.
pub struct AnyOf {
    conditions: Vec<BoxedCondition>,
}

impl AnyOf {
    pub fn new(conditions: Vec<BoxedCondition>) -> Self {
        AnyOf { conditions }
    }
}

impl Condition for AnyOf {
    fn plugin_id(&self) -> &str {
        "any_of"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        self.conditions
            .iter()
            .all(|c| c.as_predicate().is_some())
            .then_some(self as &dyn Predicate)
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        self.conditions
            .iter()
            .all(|c| c.as_query_filter().is_some())
            .then_some(self as &dyn QueryFilter)
    }
}

#[async_trait]
impl Predicate for AnyOf {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        for condition in &self.conditions {
            if let Some(predicate) = condition.as_predicate() {
                if predicate.is_satisfied_by(ctx).await {
                    return true;
                }
            }
        }
        false
    }
}

impl QueryFilter for AnyOf {
    fn identity_filter(&self, ctx: &RuleContext) -> IdentityFilter {
        IdentityFilter::Any {
            filters: self
                .conditions
                .iter()
                .filter_map(|c| c.as_query_filter())
                .map(|f| f.identity_filter(ctx))
                .collect(),
        }
    }
}

/// Negation of a condition; keeps the capabilities of its child.
pub struct Not(pub BoxedCondition);

impl Condition for Not {
    fn plugin_id(&self) -> &str {
        "not"
    }

    fn as_predicate(&self) -> Option<&dyn Predicate> {
        self.0.as_predicate().map(|_| self as &dyn Predicate)
    }

    fn as_query_filter(&self) -> Option<&dyn QueryFilter> {
        self.0.as_query_filter().map(|_| self as &dyn QueryFilter)
    }
}

#[async_trait]
impl Predicate for Not {
    async fn is_satisfied_by(&self, ctx: &RuleContext) -> bool {
        match self.0.as_predicate() {
            Some(predicate) => !predicate.is_satisfied_by(ctx).await,
            None => false,
        }
    }
}

impl QueryFilter for Not {
    fn identity_filter(&self, ctx: &RuleContext) -> IdentityFilter {
        match self.0.as_query_filter() {
            Some(filter) => IdentityFilter::Not {
                filter: Box::new(filter.identity_filter(ctx)),
            },
            None => IdentityFilter::Any { filters: vec![] },
        }
    }
}
