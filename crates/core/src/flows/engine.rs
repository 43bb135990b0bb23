use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::{ApproverDirectory, ChainResolver, RoutingError};
use crate::audit::{AuditContext, AuditOutcome, AuditSink};
use crate::config::WorkflowConfig;
use crate::domain::actor::{Owner, RequesterContext, UserId};
use crate::domain::chain::{ApprovalChain, Decision};
use crate::domain::entity::{EntityDraft, EntityId, WorkflowEntity};
use crate::domain::status::{ChainScope, EntityStatus};
use crate::errors::{DomainError, PolicyViolation, TransitionError};
use crate::flows::definition::{WorkflowCatalog, WorkflowDefinition};
use crate::flows::states::{TransitionOutcome, WorkflowAction, WorkflowOperation, WorkflowTrigger};

/// A decision submitted by an approver against one step of the active chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCommand {
    pub level: u32,
    pub decision: Decision,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub approved_amount: Option<Decimal>,
}

/// Pure transition logic shared by every entity kind.
///
/// Every operation validates first and mutates second, so an `Err` always leaves the entity
/// exactly as it was passed in.
#[derive(Clone, Debug)]
pub struct WorkflowEngine {
    catalog: WorkflowCatalog,
    require_reject_comments: bool,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(WorkflowCatalog::default(), true)
    }
}

impl WorkflowEngine {
    pub fn new(catalog: WorkflowCatalog, require_reject_comments: bool) -> Self {
        Self { catalog, require_reject_comments }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(WorkflowCatalog::from_config(config), config.require_reject_comments)
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn requires_reject_comments(&self) -> bool {
        self.require_reject_comments
    }

    /// Creates an entity owned by the requester with a freshly resolved review chain.
    pub fn open<D>(
        &self,
        directory: &D,
        requester: &RequesterContext,
        draft: EntityDraft,
    ) -> Result<(WorkflowEntity, TransitionOutcome), DomainError>
    where
        D: ApproverDirectory,
    {
        let definition = self.catalog.definition(draft.kind);

        let title = draft.title.trim().to_owned();
        if title.is_empty() {
            return Err(DomainError::InvalidInput("title must not be empty".to_owned()));
        }
        match draft.amount_requested {
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(DomainError::InvalidInput(
                    "amountRequested must be greater than zero".to_owned(),
                ));
            }
            None if definition.is_disbursable() => {
                return Err(DomainError::InvalidInput(format!(
                    "amountRequested is required for {}",
                    draft.kind.as_str()
                )));
            }
            _ => {}
        }

        let owner_entry = directory
            .find(&requester.user_id)
            .ok_or_else(|| RoutingError::UnknownOwner { user_id: requester.user_id.clone() })?;
        let chain = resolve_chain(directory, definition, ChainScope::Review, &owner_entry.user_id)?;
        let status = pending_status(&chain, ChainScope::Review)?;
        let actions = notify_active(&chain, ChainScope::Review);

        let now = Utc::now();
        let entity = WorkflowEntity {
            id: EntityId::generate(draft.kind),
            kind: draft.kind,
            owner: Owner {
                user_id: owner_entry.user_id,
                name: owner_entry.name,
                department: owner_entry.department,
            },
            title,
            description: draft.description,
            status: status.clone(),
            approval_chain: chain,
            amount_requested: draft.amount_requested,
            amount_approved: None,
            disbursements: Vec::new(),
            edit_history: Vec::new(),
            justification: None,
            attachments: draft.attachments,
            details: draft.details,
            review_started: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let outcome = TransitionOutcome {
            entity_id: entity.id.clone(),
            kind: entity.kind,
            from: None,
            to: status,
            trigger: WorkflowTrigger::Opened,
            actions,
        };
        Ok((entity, outcome))
    }

    /// Approves or rejects exactly one step of the chain implied by the entity's status.
    pub fn apply_decision(
        &self,
        entity: &mut WorkflowEntity,
        requester: &RequesterContext,
        command: DecisionCommand,
    ) -> Result<TransitionOutcome, DomainError> {
        let definition = self.catalog.definition(entity.kind);
        let scope = entity.status.active_scope().ok_or_else(|| TransitionError::NoActiveChain {
            status: entity.rendered_status(),
        })?;
        let chain = entity.chain(scope).ok_or_else(|| missing_chain(scope))?;

        let step = chain.ensure_decidable(command.level)?;
        if step.approver.user_id != requester.user_id {
            return Err(PolicyViolation::NotAssignedApprover {
                level: step.level,
                assigned: step.approver.user_id.to_string(),
                requester: requester.user_id.to_string(),
            }
            .into());
        }

        let comments = command
            .comments
            .map(|comments| comments.trim().to_owned())
            .filter(|comments| !comments.is_empty());
        if command.decision == Decision::Reject && self.require_reject_comments && comments.is_none()
        {
            return Err(TransitionError::CommentsRequired.into());
        }

        let next = chain.step(command.level + 1).map(|step| step.approver.clone());
        let closes_review =
            command.decision == Decision::Approve && next.is_none() && scope == ChainScope::Review;
        if command.approved_amount.is_some() && !closes_review {
            return Err(DomainError::InvalidInput(
                "approvedAmount is only accepted on the final review approval".to_owned(),
            ));
        }
        let approved_amount = if closes_review {
            settle_approved_amount(entity.amount_requested, command.approved_amount)?
        } else {
            None
        };

        let from = entity.status.clone();
        let owner = entity.owner.user_id.clone();
        let at = Utc::now();
        entity
            .chain_mut(scope)
            .ok_or_else(|| missing_chain(scope))?
            .record(command.level, command.decision, comments, at)?;
        if scope == ChainScope::Review && command.level == 1 {
            entity.review_started = true;
        }

        let (to, trigger, actions) = match (command.decision, next) {
            (Decision::Reject, _) => (
                EntityStatus::Rejected { scope },
                WorkflowTrigger::StepRejected { scope, level: command.level },
                vec![
                    WorkflowAction::NotifyOwner { user_id: owner },
                    WorkflowAction::UnlockEdit { scope },
                ],
            ),
            (Decision::Approve, Some(next)) => (
                EntityStatus::pending(scope, next.role),
                WorkflowTrigger::StepApproved { scope, level: command.level },
                vec![WorkflowAction::NotifyApprover {
                    user_id: next.user_id,
                    scope,
                    level: command.level + 1,
                }],
            ),
            (Decision::Approve, None) if scope == ChainScope::Review => {
                entity.amount_approved = approved_amount;
                let mut actions = vec![WorkflowAction::NotifyOwner { user_id: owner }];
                if let (true, Some(amount)) = (definition.is_disbursable(), approved_amount) {
                    actions.push(WorkflowAction::ReleaseFunds { amount });
                }
                (
                    EntityStatus::Approved,
                    WorkflowTrigger::StepApproved { scope, level: command.level },
                    actions,
                )
            }
            (Decision::Approve, None) => (
                EntityStatus::Completed,
                WorkflowTrigger::StepApproved { scope, level: command.level },
                vec![WorkflowAction::NotifyOwner { user_id: owner }, WorkflowAction::CloseRequest],
            ),
        };

        entity.status = to.clone();
        entity.updated_at = at;

        Ok(TransitionOutcome {
            entity_id: entity.id.clone(),
            kind: entity.kind,
            from: Some(from),
            to,
            trigger,
            actions,
        })
    }
}

/// Emits one audit event for the result of a workflow operation.
pub fn audit_transition<S>(
    sink: &S,
    audit: &AuditContext,
    operation: WorkflowOperation,
    result: &Result<TransitionOutcome, DomainError>,
) where
    S: AuditSink,
{
    match result {
        Ok(outcome) => {
            let mut event = audit
                .event(
                    format!("{}.applied", operation.as_str()),
                    operation.category(),
                    AuditOutcome::Success,
                )
                .with_metadata("to", outcome.to_label())
                .with_metadata("trigger", format!("{:?}", outcome.trigger));
            if let Some(from) = outcome.from_label() {
                event = event.with_metadata("from", from);
            }
            event.entity_id = Some(outcome.entity_id.clone());
            sink.emit(event);
        }
        Err(error) => {
            sink.emit(
                audit
                    .event(
                        format!("{}.rejected", operation.as_str()),
                        operation.category(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
            );
        }
    }
}

pub(crate) fn resolve_chain<D>(
    directory: &D,
    definition: &WorkflowDefinition,
    scope: ChainScope,
    owner: &UserId,
) -> Result<ApprovalChain, DomainError>
where
    D: ApproverDirectory,
{
    let roles = definition.roles(scope);
    if roles.is_empty() {
        return Err(DomainError::InvariantViolation(format!(
            "{} has no {} roles configured",
            definition.kind.as_str(),
            scope.as_str()
        )));
    }

    let approvers = ChainResolver::new(directory).resolve(owner, roles)?;
    Ok(ApprovalChain::from_approvers(approvers)?)
}

/// Status for a chain that is waiting on its first pending step.
pub(crate) fn pending_status(
    chain: &ApprovalChain,
    scope: ChainScope,
) -> Result<EntityStatus, DomainError> {
    chain
        .active_step()
        .map(|step| EntityStatus::pending(scope, step.approver.role.clone()))
        .ok_or_else(|| DomainError::InvariantViolation("new chain has no active step".to_owned()))
}

pub(crate) fn notify_active(chain: &ApprovalChain, scope: ChainScope) -> Vec<WorkflowAction> {
    chain
        .active_step()
        .map(|step| WorkflowAction::NotifyApprover {
            user_id: step.approver.user_id.clone(),
            scope,
            level: step.level,
        })
        .into_iter()
        .collect()
}

fn missing_chain(scope: ChainScope) -> DomainError {
    DomainError::InvariantViolation(format!("status refers to a missing {} chain", scope.as_str()))
}

fn settle_approved_amount(
    requested: Option<Decimal>,
    approved: Option<Decimal>,
) -> Result<Option<Decimal>, DomainError> {
    let settled = approved.or(requested);
    if let Some(amount) = settled {
        if amount <= Decimal::ZERO {
            return Err(DomainError::InvalidInput(
                "approvedAmount must be greater than zero".to_owned(),
            ));
        }
        if let Some(requested) = requested {
            if amount > requested {
                return Err(DomainError::InvalidInput(format!(
                    "approvedAmount {amount} exceeds the requested {requested}"
                )));
            }
        }
    }
    Ok(settled)
}
