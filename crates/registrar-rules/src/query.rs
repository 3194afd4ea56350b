//! Candidate-selection query handle.
//!
//! The engine never lists identities itself. It describes the selection as an
//! `IdentityQuery` and the storage collaborator executes it, either by
//! translating the filters to SQL or by calling [`IdentityQuery::matches`].

use registrar_common::{ANONYMOUS_IDENTITY, AUTHENTICATED_ROLE, IdentityId, IdentityKind, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::event::IdentityRecord;

/// One narrowing step applied to the identity set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityFilter {
    /// Identity id is one of the given ids
    Ids { ids: BTreeSet<IdentityId> },
    /// Identity id is none of the given ids
    NotIds { ids: BTreeSet<IdentityId> },
    /// Identity holds the role; every non-anonymous identity holds `authenticated`
    HasRole { role: Role },
    /// Every inner filter matches (an empty list matches everything)
    All { filters: Vec<IdentityFilter> },
    /// At least one inner filter matches (an empty list matches nothing)
    Any { filters: Vec<IdentityFilter> },
    /// The inner filter does not match
    Not { filter: Box<IdentityFilter> },
}

impl IdentityFilter {
    pub fn ids(ids: impl IntoIterator<Item = IdentityId>) -> Self {
        IdentityFilter::Ids {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn not_ids(ids: impl IntoIterator<Item = IdentityId>) -> Self {
        IdentityFilter::NotIds {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn has_role(role: impl Into<Role>) -> Self {
        IdentityFilter::HasRole { role: role.into() }
    }

    pub fn matches(&self, record: &IdentityRecord) -> bool {
        match self {
            IdentityFilter::Ids { ids } => ids.contains(&record.identity.id),
            IdentityFilter::NotIds { ids } => !ids.contains(&record.identity.id),
            IdentityFilter::HasRole { role } => {
                record.roles.contains(role)
                    || (role == AUTHENTICATED_ROLE && record.identity.id != ANONYMOUS_IDENTITY)
            }
            IdentityFilter::All { filters } => filters.iter().all(|f| f.matches(record)),
            IdentityFilter::Any { filters } => filters.iter().any(|f| f.matches(record)),
            IdentityFilter::Not { filter } => !filter.matches(record),
        }
    }
}

/// Selection of identities of one kind, narrowed by ANDed filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityQuery {
    pub kind: IdentityKind,
    pub filters: Vec<IdentityFilter>,
    /// When set the query selects nothing, whatever the filters say
    pub empty: bool,
}

impl IdentityQuery {
    pub fn new(kind: IdentityKind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            empty: false,
        }
    }

    /// Narrow the selection
    pub fn filter(&mut self, filter: IdentityFilter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Make the query select nothing
    pub fn force_empty(&mut self) -> &mut Self {
        self.empty = true;
        self
    }

    pub fn is_forced_empty(&self) -> bool {
        self.empty
    }

    pub fn matches(&self, record: &IdentityRecord) -> bool {
        !self.empty
            && record.identity.kind == self.kind
            && self.filters.iter().all(|f| f.matches(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_common::IdentityRef;
    use uuid::Uuid;

    fn record(id: Uuid, roles: &[&str]) -> IdentityRecord {
        IdentityRecord {
            identity: IdentityRef::user(id),
            name: format!("user-{id}"),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_filters_are_anded() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut query = IdentityQuery::new(IdentityKind::User);
        query
            .filter(IdentityFilter::has_role("member"))
            .filter(IdentityFilter::not_ids([bob]));

        assert!(query.matches(&record(alice, &["member"])));
        assert!(!query.matches(&record(bob, &["member"])));
        assert!(!query.matches(&record(Uuid::new_v4(), &["guest"])));
    }

    #[test]
    fn test_forced_empty_matches_nothing() {
        let mut query = IdentityQuery::new(IdentityKind::User);
        query.force_empty();
        assert!(!query.matches(&record(Uuid::new_v4(), &[])));
    }

    #[test]
    fn test_kind_mismatch() {
        let query = IdentityQuery::new(IdentityKind::Contact);
        assert!(!query.matches(&record(Uuid::new_v4(), &[])));
    }

    #[test]
    fn test_any_and_not() {
        let me = Uuid::new_v4();
        let any = IdentityFilter::Any {
            filters: vec![IdentityFilter::ids([me]), IdentityFilter::has_role("staff")],
        };
        assert!(any.matches(&record(me, &[])));
        assert!(any.matches(&record(Uuid::new_v4(), &["staff"])));
        assert!(!any.matches(&record(Uuid::new_v4(), &["guest"])));

        let empty_any = IdentityFilter::Any { filters: vec![] };
        assert!(!empty_any.matches(&record(me, &[])));

        let not = IdentityFilter::Not {
            filter: Box::new(IdentityFilter::has_role("banned")),
        };
        assert!(not.matches(&record(me, &["member"])));
    }

    #[test]
    fn test_authenticated_role_is_implicit() {
        let authenticated = IdentityFilter::has_role(AUTHENTICATED_ROLE);
        assert!(authenticated.matches(&record(Uuid::new_v4(), &[])));
        assert!(!authenticated.matches(&record(ANONYMOUS_IDENTITY, &[])));
    }
}
