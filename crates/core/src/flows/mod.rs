pub mod definition;
pub mod disbursement;
pub mod engine;
pub mod justification;
pub mod policy;
pub mod states;

#[cfg(test)]
pub(crate) mod testing;

pub use definition::{WorkflowCatalog, WorkflowDefinition};
pub use disbursement::DisbursementRequest;
pub use engine::{audit_transition, DecisionCommand, WorkflowEngine};
pub use justification::JustificationSubmission;
pub use policy::{can_delete, can_edit, ensure_deletable, ensure_editable, EditRequest};
pub use states::{TransitionOutcome, WorkflowAction, WorkflowOperation, WorkflowTrigger};
