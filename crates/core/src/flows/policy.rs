//! Who may delete, edit and resubmit an entity, and when.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::ApproverDirectory;
use crate::domain::actor::{RequesterContext, UserId};
use crate::domain::entity::{EditRecord, EntityChanges, WorkflowEntity};
use crate::domain::status::{ChainScope, EntityStatus};
use crate::errors::{DomainError, PolicyViolation, TransitionError};
use crate::flows::engine::{notify_active, pending_status, resolve_chain, WorkflowEngine};
use crate::flows::states::{TransitionOutcome, WorkflowTrigger};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    #[serde(default)]
    pub changes: EntityChanges,
    pub reason: String,
}

/// The owner may delete only while nothing has happened yet: the status is still the initial
/// review status, step 1 is pending and review has never started. The `review_started` latch
/// keeps this false forever once step 1 has been decided, whatever the status says later.
pub fn can_delete(entity: &WorkflowEntity, requester: &UserId) -> bool {
    ensure_deletable(entity, requester).is_ok()
}

pub fn ensure_deletable(entity: &WorkflowEntity, requester: &UserId) -> Result<(), DomainError> {
    if !entity.is_owned_by(requester) {
        return Err(PolicyViolation::NotOwner { operation: "delete" }.into());
    }

    let first = entity.approval_chain.first().ok_or_else(|| {
        DomainError::InvariantViolation("review chain has no steps".to_owned())
    })?;
    if entity.review_started || !first.is_pending() {
        return Err(PolicyViolation::ReviewStarted.into());
    }

    let initial = EntityStatus::pending(ChainScope::Review, first.approver.role.clone());
    if entity.status != initial {
        return Err(TransitionError::StatusNotAllowed {
            operation: "delete",
            status: entity.rendered_status(),
        }
        .into());
    }

    Ok(())
}

/// Only the owner, and only from a terminal rejection of either chain.
pub fn can_edit(entity: &WorkflowEntity, requester: &UserId) -> bool {
    ensure_editable(entity, requester).is_ok()
}

pub fn ensure_editable(entity: &WorkflowEntity, requester: &UserId) -> Result<ChainScope, DomainError> {
    if !entity.is_owned_by(requester) {
        return Err(PolicyViolation::NotOwner { operation: "edit" }.into());
    }

    entity
        .status
        .rejected_scope()
        .ok_or_else(|| PolicyViolation::NotEditable { status: entity.rendered_status() }.into())
}

impl WorkflowEngine {
    /// Applies the owner's changes to a rejected entity and sends the rejected chain back to
    /// level 1 with freshly resolved approvers.
    pub fn submit_edit<D>(
        &self,
        directory: &D,
        entity: &mut WorkflowEntity,
        requester: &RequesterContext,
        request: EditRequest,
    ) -> Result<TransitionOutcome, DomainError>
    where
        D: ApproverDirectory,
    {
        let scope = ensure_editable(entity, &requester.user_id)?;

        let reason = request.reason.trim().to_owned();
        if reason.is_empty() {
            return Err(DomainError::InvalidInput("an edit reason is required".to_owned()));
        }
        validate_changes(&request.changes, scope)?;

        let definition = self.catalog().definition(entity.kind);
        let chain = resolve_chain(directory, definition, scope, &entity.owner.user_id)?;
        let to = pending_status(&chain, scope)?;
        let actions = notify_active(&chain, scope);

        if scope == ChainScope::Justification && entity.justification.is_none() {
            return Err(DomainError::InvariantViolation(
                "justification rejected but no justification is recorded".to_owned(),
            ));
        }

        let from = entity.status.clone();
        let previous_status = entity.rendered_status();
        let at = Utc::now();
        let edit_number = next_edit_number(entity);
        entity.edit_history.push(EditRecord {
            edit_number,
            edited_at: at,
            edited_by: requester.user_id.clone(),
            previous_status,
            reason,
            changes: request.changes.clone(),
        });
        apply_changes(entity, request.changes);

        match scope {
            ChainScope::Review => {
                entity.approval_chain = chain;
                entity.amount_approved = None;
            }
            ChainScope::Justification => {
                if let Some(justification) = entity.justification.as_mut() {
                    justification.chain = chain;
                    justification.submitted_at = at;
                }
            }
        }
        entity.status = to.clone();
        entity.updated_at = at;

        Ok(TransitionOutcome {
            entity_id: entity.id.clone(),
            kind: entity.kind,
            from: Some(from),
            to,
            trigger: WorkflowTrigger::Resubmitted { scope, edit_number },
            actions,
        })
    }
}

fn next_edit_number(entity: &WorkflowEntity) -> u32 {
    u32::try_from(entity.total_edits()).map_or(u32::MAX, |count| count.saturating_add(1))
}

fn validate_changes(changes: &EntityChanges, scope: ChainScope) -> Result<(), DomainError> {
    if let Some(title) = &changes.title {
        if title.trim().is_empty() {
            return Err(DomainError::InvalidInput("title must not be empty".to_owned()));
        }
    }
    if let Some(amount) = changes.amount_requested {
        if amount <= Decimal::ZERO {
            return Err(DomainError::InvalidInput(
                "amountRequested must be greater than zero".to_owned(),
            ));
        }
    }

    let touches_review = changes.title.is_some()
        || changes.description.is_some()
        || changes.amount_requested.is_some()
        || changes.attachments.is_some()
        || changes.details.is_some();
    let touches_justification =
        changes.justification_notes.is_some() || changes.justification_attachments.is_some();

    match scope {
        ChainScope::Review if touches_justification => Err(DomainError::InvalidInput(
            "justification fields cannot change while the request itself is rejected".to_owned(),
        )),
        ChainScope::Justification if touches_review => Err(DomainError::InvalidInput(
            "only justification fields can change after disbursement".to_owned(),
        )),
        ChainScope::Justification => match &changes.justification_notes {
            Some(notes) if notes.trim().is_empty() => Err(DomainError::InvalidInput(
                "justification notes must not be empty".to_owned(),
            )),
            _ => Ok(()),
        },
        ChainScope::Review => Ok(()),
    }
}

fn apply_changes(entity: &mut WorkflowEntity, changes: EntityChanges) {
    if let Some(title) = changes.title {
        entity.title = title.trim().to_owned();
    }
    if let Some(description) = changes.description {
        entity.description = description;
    }
    if let Some(amount) = changes.amount_requested {
        entity.amount_requested = Some(amount);
    }
    if let Some(attachments) = changes.attachments {
        entity.attachments = attachments;
    }
    if let Some(details) = changes.details {
        entity.details = details;
    }

    if let Some(justification) = entity.justification.as_mut() {
        if let Some(notes) = changes.justification_notes {
            justification.notes = notes;
        }
        if let Some(attachments) = changes.justification_attachments {
            justification.attachments = attachments;
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{can_delete, can_edit, ensure_deletable, EditRequest};
    use crate::domain::actor::UserId;
    use crate::domain::chain::{Decision, StepStatus};
    use crate::domain::entity::EntityChanges;
    use crate::domain::status::ChainScope;
    use crate::errors::{DomainError, PolicyViolation};
    use crate::flows::testing::{approve, cash_request, directory, engine, reject, requester};

    fn owner() -> UserId {
        UserId::new("u-staff")
    }

    fn revised_budget() -> EditRequest {
        EditRequest {
            changes: EntityChanges {
                amount_requested: Some(Decimal::from(5_000)),
                ..EntityChanges::default()
            },
            reason: "revised budget".to_owned(),
        }
    }

    #[test]
    fn fresh_entity_is_deletable_by_owner_only() {
        let (entity, _) = cash_request(10_000);

        assert!(can_delete(&entity, &owner()));
        assert!(!can_delete(&entity, &UserId::new("u-lead")));
        assert!(matches!(
            ensure_deletable(&entity, &UserId::new("u-lead")),
            Err(DomainError::PolicyViolation(PolicyViolation::NotOwner { .. }))
        ));
    }

    #[test]
    fn any_decision_on_step_one_closes_deletion_for_good() {
        let engine = engine();

        let (mut approved, _) = cash_request(10_000);
        approve(&engine, &mut approved, "u-lead", 1).expect("approve");
        assert!(!can_delete(&approved, &owner()));

        let (mut rejected, _) = cash_request(10_000);
        reject(&engine, &mut rejected, "u-lead", 1, Some("no quote")).expect("reject");
        engine
            .submit_edit(&directory(), &mut rejected, &requester("u-staff", "staff"), revised_budget())
            .expect("resubmit");

        assert_eq!(rejected.rendered_status(), "pending_supervisor");
        assert_eq!(rejected.approval_chain.steps()[0].status, StepStatus::Pending);
        assert!(!can_delete(&rejected, &owner()));
        assert!(matches!(
            ensure_deletable(&rejected, &owner()),
            Err(DomainError::PolicyViolation(PolicyViolation::ReviewStarted))
        ));
    }

    #[test]
    fn scenario_e_approved_first_step_blocks_delete_despite_early_status() {
        let (mut entity, _) = cash_request(10_000);
        let mut steps = entity.approval_chain.steps().to_vec();
        steps[0].status = StepStatus::Approved;
        entity.approval_chain =
            crate::domain::chain::ApprovalChain::from_steps(steps).expect("fixture chain");

        assert_eq!(entity.rendered_status(), "pending_supervisor");
        assert!(!entity.review_started);
        assert!(!can_delete(&entity, &owner()));
    }

    #[test]
    fn edit_is_only_open_after_rejection() {
        let engine = engine();
        let (mut entity, _) = cash_request(10_000);
        assert!(!can_edit(&entity, &owner()));

        let error = engine
            .submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), revised_budget())
            .expect_err("not rejected yet");
        assert!(matches!(
            error,
            DomainError::PolicyViolation(PolicyViolation::NotEditable { .. })
        ));

        reject(&engine, &mut entity, "u-lead", 1, Some("missing quote")).expect("reject");
        assert!(can_edit(&entity, &owner()));
        assert!(!can_edit(&entity, &UserId::new("u-lead")));
    }

    #[test]
    fn scenario_c_resubmission_resets_the_chain() {
        let engine = engine();
        let (mut entity, _) = cash_request(10_000);
        approve(&engine, &mut entity, "u-lead", 1).expect("approve");
        reject(&engine, &mut entity, "u-fin", 2, Some("insufficient budget")).expect("reject");
        assert_eq!(entity.rendered_status(), "denied");

        let outcome = engine
            .submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), revised_budget())
            .expect("resubmit");

        assert_eq!(entity.rendered_status(), "pending_supervisor");
        assert_eq!(entity.approval_chain.len(), 2);
        assert!(entity.approval_chain.steps().iter().all(|step| step.is_pending()));
        assert!(entity.approval_chain.steps().iter().all(|step| step.acted_at.is_none()));
        assert_eq!(entity.total_edits(), 1);
        assert!(entity.is_edited());
        assert_eq!(entity.amount_requested, Some(Decimal::from(5_000)));
        assert_eq!(entity.amount_approved, None);

        let record = &entity.edit_history[0];
        assert_eq!(record.edit_number, 1);
        assert_eq!(record.previous_status, "denied");
        assert_eq!(record.reason, "revised budget");
        assert_eq!(outcome.from_label().as_deref(), Some("denied"));
    }

    #[test]
    fn resubmitted_entity_can_be_approved_again() {
        let engine = engine();
        let (mut entity, _) = cash_request(10_000);
        reject(&engine, &mut entity, "u-lead", 1, Some("too high")).expect("reject");
        engine
            .submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), revised_budget())
            .expect("resubmit");

        approve(&engine, &mut entity, "u-lead", 1).expect("approve level 1");
        engine
            .apply_decision(
                &mut entity,
                &requester("u-fin", "finance"),
                crate::flows::engine::DecisionCommand {
                    level: 2,
                    decision: Decision::Approve,
                    comments: None,
                    approved_amount: None,
                },
            )
            .expect("approve level 2");

        assert_eq!(entity.rendered_status(), "approved");
        assert_eq!(entity.amount_approved, Some(Decimal::from(5_000)));
    }

    #[test]
    fn edit_requires_reason_and_leaves_entity_untouched_on_failure() {
        let engine = engine();
        let (mut entity, _) = cash_request(10_000);
        reject(&engine, &mut entity, "u-lead", 1, Some("too high")).expect("reject");
        let before = entity.clone();

        let blank_reason = EditRequest { reason: "  ".to_owned(), ..revised_budget() };
        assert!(matches!(
            engine.submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), blank_reason),
            Err(DomainError::InvalidInput(_))
        ));

        let wrong_fields = EditRequest {
            changes: EntityChanges {
                justification_notes: Some("receipts".to_owned()),
                ..EntityChanges::default()
            },
            reason: "adding receipts".to_owned(),
        };
        assert!(matches!(
            engine.submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), wrong_fields),
            Err(DomainError::InvalidInput(_))
        ));

        let stranger = engine
            .submit_edit(&directory(), &mut entity, &requester("u-lead", "supervisor"), revised_budget())
            .expect_err("only the owner edits");
        assert!(matches!(stranger, DomainError::PolicyViolation(PolicyViolation::NotOwner { .. })));

        assert_eq!(entity, before);
        assert_eq!(entity.status.rejected_scope(), Some(ChainScope::Review));
    }
}
