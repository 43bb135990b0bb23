use std::collections::BTreeMap;

use sqlx::Row;

use procura_core::{AuditCategory, AuditEvent, AuditOutcome, EntityId};

use super::entity::parse_timestamp;
use super::{AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let entity_id: Option<String> = row.try_get("entity_id").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let outcome: String = row.try_get("outcome").map_err(decode)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode)?;

    Ok(AuditEvent {
        event_id: row.try_get("id").map_err(decode)?,
        entity_id: entity_id.map(EntityId),
        correlation_id: row.try_get("correlation_id").map_err(decode)?,
        event_type: row.try_get("event_type").map_err(decode)?,
        category: AuditCategory::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category}`")))?,
        actor: row.try_get("actor").map_err(decode)?,
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome}`")))?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, entity_id, correlation_id, event_type, category, actor,
                                      outcome, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.entity_id.as_ref().map(|id| id.0.clone()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, entity_id, correlation_id, event_type, category, actor, outcome,
                    metadata_json, occurred_at
             FROM audit_event WHERE entity_id = ? ORDER BY occurred_at, rowid",
        )
        .bind(&entity_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use procura_core::{AuditCategory, AuditEvent, AuditOutcome, EntityId};

    use super::SqlAuditRepository;
    use crate::repositories::AuditRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn events_are_listed_per_entity_in_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repo = SqlAuditRepository::new(pool);
        let entity_id = EntityId("CR-1".to_owned());

        let opened = AuditEvent::new(
            Some(entity_id.clone()),
            "req-1",
            "open.applied",
            AuditCategory::Workflow,
            "u-1",
            AuditOutcome::Success,
        )
        .with_metadata("to", "pending_supervisor");
        let rejected = AuditEvent::new(
            Some(entity_id.clone()),
            "req-2",
            "decide.rejected",
            AuditCategory::Policy,
            "u-9",
            AuditOutcome::Rejected,
        );
        let unrelated = AuditEvent::new(
            Some(EntityId("CR-2".to_owned())),
            "req-3",
            "open.applied",
            AuditCategory::Workflow,
            "u-1",
            AuditOutcome::Success,
        );

        for event in [&opened, &rejected, &unrelated] {
            repo.append(event).await.expect("append");
        }

        let trail = repo.list_for_entity(&entity_id).await.expect("list");
        assert_eq!(trail, vec![opened, rejected]);
    }
}
