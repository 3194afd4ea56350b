//! Rule repository

use async_trait::async_trait;
use registrar_common::{AppResult, ComponentId, EventRef};
use registrar_rules::config::RuleDefinition;
use registrar_rules::rule::{ActionRecord, ConditionRecord, RuleRecord, RuleScope};
use registrar_rules::store::RuleStore;
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    event_type: String,
    event_id: Uuid,
    trigger: String,
    is_default: bool,
    conditions: Json<Vec<ConditionRecord>>,
    actions: Json<Vec<ActionRecord>>,
}

impl From<RuleRow> for RuleRecord {
    fn from(row: RuleRow) -> Self {
        RuleRecord {
            id: row.id,
            event: EventRef::new(row.event_type, row.event_id),
            trigger: row.trigger,
            is_default: row.is_default,
            conditions: row.conditions.0,
            actions: row.actions.0,
        }
    }
}

const RULE_COLUMNS: &str = "id, event_type, event_id, trigger, is_default, conditions, actions";

/// Rule store backed by Postgres; components live in JSONB columns
#[derive(Clone)]
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        record: &RuleRecord,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rules (id, event_type, event_id, trigger, is_default, position, conditions, actions)
            VALUES (
                $1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM rules WHERE event_type = $2 AND event_id = $3),
                $6, $7
            )
            "#,
        )
        .bind(record.id)
        .bind(&record.event.entity_type)
        .bind(record.event.id)
        .bind(&record.trigger)
        .bind(record.is_default)
        .bind(Json(&record.conditions))
        .bind(Json(&record.actions))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn load_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        scope: RuleScope,
    ) -> AppResult<Vec<RuleRecord>> {
        let is_default = match scope {
            RuleScope::All => None,
            RuleScope::DefaultOnly => Some(true),
            RuleScope::CustomOnly => Some(false),
        };

        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM rules
            WHERE event_type = $1 AND event_id = $2 AND trigger = $3
              AND ($4::BOOLEAN IS NULL OR is_default = $4)
            ORDER BY position
            "#
        ))
        .bind(&event.entity_type)
        .bind(event.id)
        .bind(trigger)
        .bind(is_default)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RuleRecord::from).collect())
    }

    async fn find_rule_by_component(
        &self,
        component: ComponentId,
    ) -> AppResult<Option<RuleRecord>> {
        let probe = Json(json!([{ "id": component }]));
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            r#"SELECT {RULE_COLUMNS} FROM rules WHERE conditions @> $1 OR actions @> $1 LIMIT 1"#
        ))
        .bind(probe)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RuleRecord::from))
    }

    async fn replace_rules(
        &self,
        event: &EventRef,
        trigger: &str,
        definitions: &[RuleDefinition],
        is_default: bool,
    ) -> AppResult<Vec<RuleRecord>> {
        let records: Vec<RuleRecord> = definitions
            .iter()
            .filter(|d| d.trigger == trigger)
            .map(|d| RuleRecord::from_definition(event.clone(), d.clone(), is_default))
            .collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(r#"DELETE FROM rules WHERE event_type = $1 AND event_id = $2 AND trigger = $3"#)
            .bind(&event.entity_type)
            .bind(event.id)
            .bind(trigger)
            .execute(&mut *tx)
            .await?;

        for record in &records {
            Self::insert(&mut tx, record).await?;
        }
        tx.commit().await?;

        tracing::debug!(event = %event, trigger, count = records.len(), "Replaced rules");
        Ok(records)
    }

    async fn append_rule(
        &self,
        event: &EventRef,
        definition: &RuleDefinition,
        is_default: bool,
    ) -> AppResult<RuleRecord> {
        let record = RuleRecord::from_definition(event.clone(), definition.clone(), is_default);

        let mut tx = self.pool.begin().await?;
        Self::insert(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(record)
    }
}
