//! Event, registration and identity repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registrar_common::{
    ANONYMOUS_IDENTITY, AUTHENTICATED_ROLE, AppError, AppResult, EventRef, IdentityKind,
    IdentityRef,
};
use registrar_rules::event::{Event, EventSettings, IdentityRecord, Registrant, Registration};
use registrar_rules::query::{IdentityFilter, IdentityQuery};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::RegistrationStore;

#[derive(sqlx::FromRow)]
struct EventRow {
    entity_type: String,
    id: Uuid,
    title: String,
    settings: Json<EventSettings>,
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    event_type: String,
    event_id: Uuid,
    registration_type: String,
    owner_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RegistrantRow {
    id: Uuid,
    registration_id: Uuid,
    identity_kind: String,
    identity_id: Uuid,
}

impl RegistrantRow {
    fn into_registrant(self) -> AppResult<Registrant> {
        let kind: IdentityKind = self.identity_kind.parse().map_err(AppError::Database)?;
        Ok(Registrant {
            id: self.id,
            registration: self.registration_id,
            identity: IdentityRef {
                kind,
                id: self.identity_id,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    kind: String,
    name: String,
    roles: Vec<String>,
}

impl IdentityRow {
    fn into_record(self) -> AppResult<IdentityRecord> {
        let kind: IdentityKind = self.kind.parse().map_err(AppError::Database)?;
        Ok(IdentityRecord {
            identity: IdentityRef { kind, id: self.id },
            name: self.name,
            roles: self.roles.into_iter().collect(),
        })
    }
}

/// Registration store backed by Postgres
#[derive(Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or replace an event
    pub async fn upsert_event(&self, event: &Event) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (entity_type, id, title, settings)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entity_type, id)
            DO UPDATE SET title = EXCLUDED.title, settings = EXCLUDED.settings
            "#,
        )
        .bind(&event.reference.entity_type)
        .bind(event.reference.id)
        .bind(&event.title)
        .bind(Json(&event.settings))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn registrants_by_registration(
        &self,
        event: &EventRef,
    ) -> AppResult<HashMap<Uuid, Vec<Registrant>>> {
        let mut grouped: HashMap<Uuid, Vec<Registrant>> = HashMap::new();
        for registrant in self.load_registrants(event).await? {
            grouped
                .entry(registrant.registration)
                .or_default()
                .push(registrant);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn load_event(&self, event: &EventRef) -> AppResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"SELECT entity_type, id, title, settings FROM events WHERE entity_type = $1 AND id = $2"#,
        )
        .bind(&event.entity_type)
        .bind(event.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            Event::new(
                EventRef::new(row.entity_type, row.id),
                row.title,
                row.settings.0,
            )
        }))
    }

    async fn count_registrants(&self, event: &EventRef) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM registrants rt
            JOIN registrations r ON r.id = rt.registration_id
            WHERE r.event_type = $1 AND r.event_id = $2
            "#,
        )
        .bind(&event.entity_type)
        .bind(event.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_identity_registrations(
        &self,
        identity: &IdentityRef,
        event: &EventRef,
    ) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT r.id)
            FROM registrants rt
            JOIN registrations r ON r.id = rt.registration_id
            WHERE r.event_type = $1 AND r.event_id = $2
              AND rt.identity_kind = $3 AND rt.identity_id = $4
            "#,
        )
        .bind(&event.entity_type)
        .bind(event.id)
        .bind(identity.kind.as_str())
        .bind(identity.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn load_registrants(&self, event: &EventRef) -> AppResult<Vec<Registrant>> {
        let rows = sqlx::query_as::<_, RegistrantRow>(
            r#"
            SELECT rt.id, rt.registration_id, rt.identity_kind, rt.identity_id
            FROM registrants rt
            JOIN registrations r ON r.id = rt.registration_id
            WHERE r.event_type = $1 AND r.event_id = $2
            ORDER BY r.created_at, rt.id
            "#,
        )
        .bind(&event.entity_type)
        .bind(event.id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RegistrantRow::into_registrant).collect()
    }

    async fn load_registrations(&self, event: &EventRef) -> AppResult<Vec<Registration>> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT id, event_type, event_id, registration_type, owner_id, created_at
            FROM registrations
            WHERE event_type = $1 AND event_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(&event.entity_type)
        .bind(event.id)
        .fetch_all(&self.pool)
        .await?;

        let mut registrants = self.registrants_by_registration(event).await?;
        Ok(rows
            .into_iter()
            .map(|row| Registration {
                registrants: registrants.remove(&row.id).unwrap_or_default(),
                id: row.id,
                event: EventRef::new(row.event_type, row.event_id),
                registration_type: row.registration_type,
                owner: row.owner_id,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn find_identities(&self, query: &IdentityQuery) -> AppResult<Vec<IdentityRecord>> {
        if query.is_forced_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, kind, name, roles FROM identities WHERE kind = ",
        );
        builder.push_bind(query.kind.as_str());
        for filter in &query.filters {
            builder.push(" AND ");
            push_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY name, id");

        let rows = builder
            .build_query_as::<IdentityRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(IdentityRow::into_record).collect()
    }
}

/// Translate a filter to a parenthesized SQL predicate over `identities`.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &IdentityFilter) {
    match filter {
        IdentityFilter::Ids { ids } if ids.is_empty() => {
            builder.push("FALSE");
        }
        IdentityFilter::Ids { ids } => {
            builder.push("id = ANY(");
            builder.push_bind(ids.iter().copied().collect::<Vec<Uuid>>());
            builder.push(")");
        }
        IdentityFilter::NotIds { ids } if ids.is_empty() => {
            builder.push("TRUE");
        }
        IdentityFilter::NotIds { ids } => {
            builder.push("NOT (id = ANY(");
            builder.push_bind(ids.iter().copied().collect::<Vec<Uuid>>());
            builder.push("))");
        }
        IdentityFilter::HasRole { role } if role == AUTHENTICATED_ROLE => {
            builder.push("id <> ");
            builder.push_bind(ANONYMOUS_IDENTITY);
        }
        IdentityFilter::HasRole { role } => {
            builder.push_bind(role.clone());
            builder.push(" = ANY(roles)");
        }
        IdentityFilter::All { filters } => push_joined(builder, filters, " AND ", "TRUE"),
        IdentityFilter::Any { filters } => push_joined(builder, filters, " OR ", "FALSE"),
        IdentityFilter::Not { filter } => {
            builder.push("NOT (");
            push_filter(builder, filter);
            builder.push(")");
        }
    }
}

fn push_joined(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[IdentityFilter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}
