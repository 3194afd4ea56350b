//! Scheduled trigger repository

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use registrar_common::{AppResult, ComponentId, TriggerId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{Claim, ScheduledTrigger, TriggerQueue};

/// Trigger queue backed by the `scheduled_triggers` table.
///
/// Claiming is one conditional `UPDATE ... RETURNING`, so concurrent workers
/// never run the same trigger while its lease is live. Release and delete are
/// keyed on the attempt number the claim returned, so a worker whose lease
/// expired cannot clear or delete a newer claim.
#[derive(Clone)]
pub struct PgTriggerQueue {
    pool: PgPool,
}

impl PgTriggerQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerQueue for PgTriggerQueue {
    async fn enqueue(
        &self,
        component: ComponentId,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<ScheduledTrigger> {
        let trigger = sqlx::query_as::<_, ScheduledTrigger>(
            r#"
            INSERT INTO scheduled_triggers (id, component_id, scheduled_for)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(component)
        .bind(scheduled_for)
        .fetch_one(&self.pool)
        .await?;

        Ok(trigger)
    }

    async fn get(&self, id: TriggerId) -> AppResult<Option<ScheduledTrigger>> {
        let trigger =
            sqlx::query_as::<_, ScheduledTrigger>(r#"SELECT * FROM scheduled_triggers WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(trigger)
    }

    async fn claim(&self, id: TriggerId, now: DateTime<Utc>, lease: Duration) -> AppResult<Claim> {
        let claimed = sqlx::query_as::<_, ScheduledTrigger>(
            r#"
            UPDATE scheduled_triggers
            SET attempts = attempts + 1, claimed_until = $3
            WHERE id = $1 AND (claimed_until IS NULL OR claimed_until <= $2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now + lease)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(trigger) = claimed {
            return Ok(Claim::Claimed(trigger));
        }

        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM scheduled_triggers WHERE id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists { Claim::Leased } else { Claim::Missing })
    }

    async fn release(&self, id: TriggerId, attempt: i32) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE scheduled_triggers SET claimed_until = NULL WHERE id = $1 AND attempts = $2"#,
        )
        .bind(id)
        .bind(attempt)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, id: TriggerId, attempt: i32) -> AppResult<bool> {
        let result =
            sqlx::query(r#"DELETE FROM scheduled_triggers WHERE id = $1 AND attempts = $2"#)
                .bind(id)
                .bind(attempt)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledTrigger>> {
        let triggers = sqlx::query_as::<_, ScheduledTrigger>(
            r#"
            SELECT * FROM scheduled_triggers
            WHERE scheduled_for <= $1 AND (claimed_until IS NULL OR claimed_until <= $1)
            ORDER BY scheduled_for
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(triggers)
    }
}
