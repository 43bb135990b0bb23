use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::AuditCategory;
use crate::domain::actor::UserId;
use crate::domain::entity::{EntityId, EntityKind};
use crate::domain::status::{ChainScope, EntityStatus};

/// Operations that move a workflow entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOperation {
    Open,
    Decide,
    Edit,
    Disburse,
    Justify,
    Delete,
}

impl WorkflowOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Decide => "decide",
            Self::Edit => "edit",
            Self::Disburse => "disburse",
            Self::Justify => "justify",
            Self::Delete => "delete",
        }
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            Self::Disburse => AuditCategory::Disbursement,
            Self::Edit | Self::Delete => AuditCategory::Policy,
            Self::Open | Self::Decide | Self::Justify => AuditCategory::Workflow,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowTrigger {
    Opened,
    StepApproved { scope: ChainScope, level: u32 },
    StepRejected { scope: ChainScope, level: u32 },
    Resubmitted { scope: ChainScope, edit_number: u32 },
    Disbursed { disbursement_number: u32, amount: Decimal },
    JustificationSubmitted,
}

/// Side effects the caller is expected to carry out after a transition is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    NotifyApprover { user_id: UserId, scope: ChainScope, level: u32 },
    NotifyOwner { user_id: UserId },
    UnlockEdit { scope: ChainScope },
    ReleaseFunds { amount: Decimal },
    UnlockJustification,
    CloseRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub from: Option<EntityStatus>,
    pub to: EntityStatus,
    pub trigger: WorkflowTrigger,
    pub actions: Vec<WorkflowAction>,
}

impl TransitionOutcome {
    pub fn from_label(&self) -> Option<String> {
        self.from.as_ref().map(|status| status.render(&self.kind.vocabulary()))
    }

    pub fn to_label(&self) -> String {
        self.to.render(&self.kind.vocabulary())
    }
}
