use std::collections::HashMap;

use tokio::sync::RwLock;

use procura_core::{AuditEvent, DirectoryEntry, EntityId, UserId, WorkflowEntity};

use super::{
    awaits_decision_from, AuditRepository, DirectoryRepository, EntityFilter, EntityRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryEntityRepository {
    entities: RwLock<HashMap<String, WorkflowEntity>>,
}

#[async_trait::async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<WorkflowEntity>, RepositoryError> {
        let entities = self.entities.read().await;
        Ok(entities.get(&id.0).cloned())
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<WorkflowEntity>, RepositoryError> {
        let entities = self.entities.read().await;
        let mut matching: Vec<WorkflowEntity> =
            entities.values().filter(|entity| filter.matches(entity)).cloned().collect();
        matching.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(matching)
    }

    async fn list_awaiting(
        &self,
        approver: &UserId,
    ) -> Result<Vec<WorkflowEntity>, RepositoryError> {
        let entities = self.entities.read().await;
        let mut awaiting: Vec<WorkflowEntity> = entities
            .values()
            .filter(|entity| awaits_decision_from(entity, approver))
            .cloned()
            .collect();
        awaiting.sort_by(|left, right| {
            left.updated_at.cmp(&right.updated_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(awaiting)
    }

    async fn insert(&self, entity: &WorkflowEntity) -> Result<(), RepositoryError> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(&entity.id.0) {
            return Err(RepositoryError::Duplicate { entity_id: entity.id.0.clone() });
        }
        entities.insert(entity.id.0.clone(), entity.clone());
        Ok(())
    }

    async fn save(
        &self,
        entity: &WorkflowEntity,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        let mut entities = self.entities.write().await;
        let stored = entities
            .get_mut(&entity.id.0)
            .ok_or_else(|| RepositoryError::NotFound { entity_id: entity.id.0.clone() })?;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                entity_id: entity.id.0.clone(),
                expected_version,
            });
        }

        let next_version = expected_version + 1;
        *stored = WorkflowEntity { version: next_version, ..entity.clone() };
        Ok(next_version)
    }

    async fn delete(&self, id: &EntityId, expected_version: i64) -> Result<(), RepositoryError> {
        let mut entities = self.entities.write().await;
        match entities.get(&id.0) {
            None => Err(RepositoryError::NotFound { entity_id: id.0.clone() }),
            Some(stored) if stored.version != expected_version => {
                Err(RepositoryError::Conflict { entity_id: id.0.clone(), expected_version })
            }
            Some(_) => {
                entities.remove(&id.0);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl InMemoryDirectoryRepository {
    pub fn with_entries(entries: Vec<DirectoryEntry>) -> Self {
        let entries =
            entries.into_iter().map(|entry| (entry.user_id.to_string(), entry)).collect();
        Self { entries: RwLock::new(entries) }
    }
}

#[async_trait::async_trait]
impl DirectoryRepository for InMemoryDirectoryRepository {
    async fn upsert(&self, entry: &DirectoryEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.user_id.to_string(), entry.clone());
        Ok(())
    }

    async fn find(&self, user_id: &UserId) -> Result<Option<DirectoryEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(user_id.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<DirectoryEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut listed: Vec<DirectoryEntry> = entries.values().cloned().collect();
        listed.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| event.entity_id.as_ref() == Some(entity_id)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use procura_core::{EntityDraft, EntityKind, RequesterContext, UserId, WorkflowEngine};

    use crate::fixtures::DemoDirectory;
    use crate::repositories::{
        EntityFilter, EntityRepository, InMemoryEntityRepository, RepositoryError,
    };

    fn contract() -> procura_core::WorkflowEntity {
        let draft = EntityDraft {
            kind: EntityKind::Contract,
            title: "Warehouse lease".to_owned(),
            description: String::new(),
            amount_requested: Some(Decimal::from(48_000)),
            attachments: Vec::new(),
            details: serde_json::Value::Null,
        };
        WorkflowEngine::default()
            .open(&DemoDirectory::directory(), &RequesterContext::new("u-amara", "staff"), draft)
            .expect("open contract")
            .0
    }

    #[tokio::test]
    async fn in_memory_entity_repo_round_trip() {
        let repo = InMemoryEntityRepository::default();
        let entity = contract();

        repo.insert(&entity).await.expect("insert");
        let found = repo.find_by_id(&entity.id).await.expect("find");

        assert_eq!(found, Some(entity));
    }

    #[tokio::test]
    async fn in_memory_save_enforces_the_version_precondition() {
        let repo = InMemoryEntityRepository::default();
        let mut entity = contract();
        repo.insert(&entity).await.expect("insert");

        entity.version = repo.save(&entity, 0).await.expect("first save");
        assert_eq!(entity.version, 1);
        assert!(matches!(
            repo.save(&entity, 0).await,
            Err(RepositoryError::Conflict { expected_version: 0, .. })
        ));
        assert_eq!(repo.find_by_id(&entity.id).await.expect("find").map(|e| e.version), Some(1));
    }

    #[tokio::test]
    async fn in_memory_queues_match_the_active_step() {
        let repo = InMemoryEntityRepository::default();
        let entity = contract();
        repo.insert(&entity).await.expect("insert");

        let legal = entity.approval_chain.steps()[0].approver.user_id.clone();
        let finance = entity.approval_chain.steps()[1].approver.user_id.clone();

        assert_eq!(repo.list_awaiting(&legal).await.expect("legal queue").len(), 1);
        assert!(repo.list_awaiting(&finance).await.expect("finance queue").is_empty());
        assert!(repo
            .list(&EntityFilter { owner: Some(UserId::new("u-kofi")), ..EntityFilter::default() })
            .await
            .expect("list by owner")
            .is_empty());
    }
}
