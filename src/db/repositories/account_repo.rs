//! Account role and permission repository

use async_trait::async_trait;
use registrar_common::{AUTHENTICATED_ROLE, AppResult, Role};
use registrar_rules::directory::AccountDirectory;
use registrar_rules::event::Account;
use sqlx::PgPool;
use std::collections::BTreeSet;

/// Account directory over the `identities`, `roles` and `role_permissions` tables.
///
/// Every non-anonymous account implicitly holds the `authenticated` role.
#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn has_permission(&self, account: &Account, permission: &str) -> AppResult<bool> {
        let roles: Vec<Role> = self.roles_of(account).await?.into_iter().collect();
        if roles.is_empty() {
            return Ok(false);
        }

        let granted = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM role_permissions WHERE role = ANY($1) AND permission = $2)"#,
        )
        .bind(&roles)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;

        Ok(granted)
    }

    async fn roles_of(&self, account: &Account) -> AppResult<BTreeSet<Role>> {
        if account.is_anonymous() {
            return Ok(BTreeSet::new());
        }

        let roles = sqlx::query_scalar::<_, Vec<String>>(
            r#"SELECT roles FROM identities WHERE id = $1 AND kind = 'user'"#,
        )
        .bind(account.id)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or_default();

        let mut roles: BTreeSet<Role> = roles.into_iter().collect();
        roles.insert(AUTHENTICATED_ROLE.to_string());
        Ok(roles)
    }

    async fn roles(&self) -> AppResult<Vec<Role>> {
        let roles = sqlx::query_scalar::<_, String>(r#"SELECT name FROM roles ORDER BY name"#)
            .fetch_all(&self.pool)
            .await?;

        Ok(roles)
    }
}
