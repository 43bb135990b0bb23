//! Application service: load, apply a pure transition, save under the version precondition.
//!
//! Every workflow operation runs the same sequence. The engine never touches storage and the
//! repositories never decide anything; this module is the only place where the two meet.

use std::sync::Arc;

use tracing::{info, warn};

use procura_core::config::WorkflowConfig;
use procura_core::flows::ensure_deletable;
use procura_core::{
    audit_transition, ApplicationError, AuditCategory, AuditContext, AuditEvent, AuditOutcome,
    DecisionCommand, DisbursementRequest, DomainError, EditRequest, EntityDraft, EntityId,
    InMemoryApproverDirectory, InMemoryAuditSink, JustificationSubmission, RequesterContext,
    TransitionOutcome, WorkflowEngine, WorkflowEntity, WorkflowOperation,
};
use procura_db::repositories::{
    InMemoryAuditRepository, InMemoryDirectoryRepository, InMemoryEntityRepository,
    SqlAuditRepository, SqlDirectoryRepository, SqlEntityRepository,
};
use procura_db::{
    AuditRepository, DbPool, DirectoryRepository, EntityFilter, EntityRepository,
    RepositoryError,
};

#[derive(Clone)]
pub struct WorkflowService {
    engine: Arc<WorkflowEngine>,
    entities: Arc<dyn EntityRepository>,
    directory: Arc<dyn DirectoryRepository>,
    audit: Arc<dyn AuditRepository>,
}

impl WorkflowService {
    pub fn new(
        engine: WorkflowEngine,
        entities: Arc<dyn EntityRepository>,
        directory: Arc<dyn DirectoryRepository>,
        audit: Arc<dyn AuditRepository>,
    ) -> Self {
        Self { engine: Arc::new(engine), entities, directory, audit }
    }

    pub fn sqlite(pool: DbPool, config: &WorkflowConfig) -> Self {
        Self::new(
            WorkflowEngine::from_config(config),
            Arc::new(SqlEntityRepository::new(pool.clone())),
            Arc::new(SqlDirectoryRepository::new(pool.clone())),
            Arc::new(SqlAuditRepository::new(pool)),
        )
    }

    pub fn in_memory(engine: WorkflowEngine, directory: InMemoryDirectoryRepository) -> Self {
        Self::new(
            engine,
            Arc::new(InMemoryEntityRepository::default()),
            Arc::new(directory),
            Arc::new(InMemoryAuditRepository::default()),
        )
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn create(
        &self,
        requester: &RequesterContext,
        correlation_id: &str,
        draft: EntityDraft,
    ) -> Result<WorkflowEntity, ApplicationError> {
        let directory = self.directory_snapshot().await?;
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(None, correlation_id, requester.user_id.as_str());

        let (entity, outcome) = match self.engine.open(&directory, requester, draft) {
            Ok(opened) => opened,
            Err(error) => {
                audit_transition(&sink, &context, WorkflowOperation::Open, &Err(error.clone()));
                self.flush_audit(&sink).await;
                log_rejected(WorkflowOperation::Open, correlation_id, None, &error);
                return Err(error.into());
            }
        };

        self.entities.insert(&entity).await.map_err(into_application)?;
        audit_transition(&sink, &context, WorkflowOperation::Open, &Ok(outcome.clone()));
        self.flush_audit(&sink).await;
        log_applied(WorkflowOperation::Open, correlation_id, &outcome);
        Ok(entity)
    }

    pub async fn get(&self, id: &EntityId) -> Result<WorkflowEntity, ApplicationError> {
        self.entities
            .find_by_id(id)
            .await
            .map_err(into_application)?
            .ok_or_else(|| not_found(id))
    }

    pub async fn list(
        &self,
        filter: &EntityFilter,
    ) -> Result<Vec<WorkflowEntity>, ApplicationError> {
        self.entities.list(filter).await.map_err(into_application)
    }

    /// Entities whose active step is assigned to the requester.
    pub async fn pending_for(
        &self,
        requester: &RequesterContext,
    ) -> Result<Vec<WorkflowEntity>, ApplicationError> {
        self.entities.list_awaiting(&requester.user_id).await.map_err(into_application)
    }

    pub async fn decide(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
        command: DecisionCommand,
    ) -> Result<WorkflowEntity, ApplicationError> {
        self.transition(
            id,
            requester,
            correlation_id,
            WorkflowOperation::Decide,
            |engine, _, entity| engine.apply_decision(entity, requester, command),
        )
        .await
    }

    pub async fn disburse(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
        request: DisbursementRequest,
    ) -> Result<WorkflowEntity, ApplicationError> {
        self.transition(
            id,
            requester,
            correlation_id,
            WorkflowOperation::Disburse,
            |engine, _, entity| engine.record_disbursement(entity, requester, request),
        )
        .await
    }

    pub async fn edit(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
        request: EditRequest,
    ) -> Result<WorkflowEntity, ApplicationError> {
        self.transition(
            id,
            requester,
            correlation_id,
            WorkflowOperation::Edit,
            |engine, directory, entity| engine.submit_edit(directory, entity, requester, request),
        )
        .await
    }

    pub async fn justify(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
        submission: JustificationSubmission,
    ) -> Result<WorkflowEntity, ApplicationError> {
        self.transition(
            id,
            requester,
            correlation_id,
            WorkflowOperation::Justify,
            |engine, directory, entity| {
                engine.start_justification(directory, entity, requester, submission)
            },
        )
        .await
    }

    pub async fn delete(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let entity = self.get(id).await?;
        let context =
            AuditContext::new(Some(id.clone()), correlation_id, requester.user_id.as_str());

        if let Err(error) = ensure_deletable(&entity, &requester.user_id) {
            self.record(
                context
                    .event("delete.rejected", AuditCategory::Policy, AuditOutcome::Rejected)
                    .with_metadata("error", error.to_string()),
            )
            .await;
            log_rejected(WorkflowOperation::Delete, correlation_id, Some(id), &error);
            return Err(error.into());
        }

        self.entities.delete(id, entity.version).await.map_err(into_application)?;
        self.record(
            context
                .event("delete.applied", AuditCategory::Workflow, AuditOutcome::Success)
                .with_metadata("from", entity.rendered_status()),
        )
        .await;
        info!(
            event_name = "workflow.delete.applied",
            correlation_id = %correlation_id,
            entity_id = %id,
            "entity deleted by its owner"
        );
        Ok(())
    }

    pub async fn audit_trail(&self, id: &EntityId) -> Result<Vec<AuditEvent>, ApplicationError> {
        self.audit.list_for_entity(id).await.map_err(into_application)
    }

    async fn transition<F>(
        &self,
        id: &EntityId,
        requester: &RequesterContext,
        correlation_id: &str,
        operation: WorkflowOperation,
        apply: F,
    ) -> Result<WorkflowEntity, ApplicationError>
    where
        F: FnOnce(
            &WorkflowEngine,
            &InMemoryApproverDirectory,
            &mut WorkflowEntity,
        ) -> Result<TransitionOutcome, DomainError>,
    {
        let mut entity = self.get(id).await?;
        let expected_version = entity.version;
        let directory = self.directory_snapshot().await?;

        let sink = InMemoryAuditSink::default();
        let context =
            AuditContext::new(Some(id.clone()), correlation_id, requester.user_id.as_str());
        let result = apply(&self.engine, &directory, &mut entity);
        audit_transition(&sink, &context, operation, &result);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                self.flush_audit(&sink).await;
                log_rejected(operation, correlation_id, Some(id), &error);
                return Err(error.into());
            }
        };

        entity.version =
            self.entities.save(&entity, expected_version).await.map_err(into_application)?;
        self.flush_audit(&sink).await;
        log_applied(operation, correlation_id, &outcome);
        Ok(entity)
    }

    async fn directory_snapshot(&self) -> Result<InMemoryApproverDirectory, ApplicationError> {
        self.directory.snapshot().await.map_err(into_application)
    }

    async fn flush_audit(&self, sink: &InMemoryAuditSink) {
        for event in sink.drain() {
            self.record(event).await;
        }
    }

    /// Audit writes never fail the operation they describe.
    async fn record(&self, event: AuditEvent) {
        if let Err(error) = self.audit.append(&event).await {
            warn!(
                event_name = "persistence.audit.append_failed",
                correlation_id = %event.correlation_id,
                audit_event_type = %event.event_type,
                error = %error,
                "failed to persist audit event"
            );
        }
    }
}

fn log_applied(operation: WorkflowOperation, correlation_id: &str, outcome: &TransitionOutcome) {
    info!(
        event_name = %format!("workflow.{}.applied", operation.as_str()),
        correlation_id = %correlation_id,
        entity_id = %outcome.entity_id,
        from = %outcome.from_label().unwrap_or_default(),
        to = %outcome.to_label(),
        "workflow transition applied"
    );
}

fn log_rejected(
    operation: WorkflowOperation,
    correlation_id: &str,
    entity_id: Option<&EntityId>,
    error: &DomainError,
) {
    warn!(
        event_name = %format!("workflow.{}.rejected", operation.as_str()),
        correlation_id = %correlation_id,
        entity_id = entity_id.map(|id| id.0.as_str()).unwrap_or("unknown"),
        error = %error,
        "workflow transition rejected"
    );
}

fn not_found(id: &EntityId) -> ApplicationError {
    DomainError::NotFound { resource: "entity", id: id.0.clone() }.into()
}

fn into_application(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Conflict { entity_id, expected_version } => {
            ApplicationError::Conflict { entity_id, expected_version }
        }
        RepositoryError::NotFound { entity_id } => {
            DomainError::NotFound { resource: "entity", id: entity_id }.into()
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}
