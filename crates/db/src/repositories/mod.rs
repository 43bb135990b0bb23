use async_trait::async_trait;
use thiserror::Error;

use procura_core::{
    AuditEvent, DirectoryEntry, EntityId, EntityKind, InMemoryApproverDirectory, UserId,
    WorkflowEntity,
};

pub mod audit;
pub mod directory;
pub mod entity;
pub mod memory;

pub use audit::SqlAuditRepository;
pub use directory::SqlDirectoryRepository;
pub use entity::SqlEntityRepository;
pub use memory::{InMemoryAuditRepository, InMemoryDirectoryRepository, InMemoryEntityRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("entity `{entity_id}` already exists")]
    Duplicate { entity_id: String },
    #[error("entity `{entity_id}` not found")]
    NotFound { entity_id: String },
    #[error("entity `{entity_id}` was modified concurrently (expected version {expected_version})")]
    Conflict { entity_id: String, expected_version: i64 },
}

/// Listing filter; `status` compares against the rendered status string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub status: Option<String>,
    pub owner: Option<UserId>,
}

impl EntityFilter {
    pub fn matches(&self, entity: &WorkflowEntity) -> bool {
        self.kind.map_or(true, |kind| entity.kind == kind)
            && self.status.as_deref().map_or(true, |status| entity.rendered_status() == status)
            && self.owner.as_ref().map_or(true, |owner| &entity.owner.user_id == owner)
    }
}

/// True when the step currently waiting on a decision belongs to `approver`.
pub fn awaits_decision_from(entity: &WorkflowEntity, approver: &UserId) -> bool {
    entity
        .active_chain()
        .and_then(|chain| chain.active_step())
        .is_some_and(|step| &step.approver.user_id == approver)
}

#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<WorkflowEntity>, RepositoryError>;

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<WorkflowEntity>, RepositoryError>;

    async fn list_awaiting(&self, approver: &UserId)
        -> Result<Vec<WorkflowEntity>, RepositoryError>;

    async fn insert(&self, entity: &WorkflowEntity) -> Result<(), RepositoryError>;

    /// Writes `entity` only if the stored version still equals `expected_version`.
    /// Returns the new version.
    async fn save(
        &self,
        entity: &WorkflowEntity,
        expected_version: i64,
    ) -> Result<i64, RepositoryError>;

    async fn delete(&self, id: &EntityId, expected_version: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn upsert(&self, entry: &DirectoryEntry) -> Result<(), RepositoryError>;

    async fn find(&self, user_id: &UserId) -> Result<Option<DirectoryEntry>, RepositoryError>;

    async fn list(&self) -> Result<Vec<DirectoryEntry>, RepositoryError>;

    /// Point-in-time copy used for chain resolution.
    async fn snapshot(&self) -> Result<InMemoryApproverDirectory, RepositoryError> {
        Ok(InMemoryApproverDirectory::new(self.list().await?))
    }
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError>;

    async fn list_for_entity(&self, entity_id: &EntityId)
        -> Result<Vec<AuditEvent>, RepositoryError>;
}
