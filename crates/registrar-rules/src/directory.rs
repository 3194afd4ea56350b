//! Account permission and role lookups.
//!
//! Permission storage and role administration live outside the engine; this
//! trait is the seam conditions and the candidate query builder call through.

use async_trait::async_trait;
use registrar_common::{AppResult, Role};
use std::collections::BTreeSet;

use crate::event::Account;

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Whether the account holds the permission string
    async fn has_permission(&self, account: &Account, permission: &str) -> AppResult<bool>;

    /// Roles held by the account
    async fn roles_of(&self, account: &Account) -> AppResult<BTreeSet<Role>>;

    /// Every role known to the site
    async fn roles(&self) -> AppResult<Vec<Role>>;
}
