pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use approvals::{
    ApproverDirectory, ChainResolver, DirectoryEntry, InMemoryApproverDirectory, RoutingError,
};
pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use domain::actor::{Owner, RequesterContext, Role, UserId};
pub use domain::chain::{ApprovalChain, ApprovalStep, Approver, ChainError, Decision, StepStatus};
pub use domain::entity::{
    Attachment, Disbursement, EditRecord, EntityChanges, EntityDraft, EntityId, EntityKind,
    Justification, WorkflowEntity,
};
pub use domain::status::{ChainScope, EntityStatus, StatusVocabulary};
pub use errors::{ApplicationError, DomainError, InterfaceError, PolicyViolation, TransitionError};
pub use flows::{
    audit_transition, can_delete, can_edit, DecisionCommand, DisbursementRequest, EditRequest,
    JustificationSubmission, TransitionOutcome, WorkflowAction, WorkflowCatalog, WorkflowEngine,
    WorkflowOperation,
};
