use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::approvals::ApproverDirectory;
use crate::domain::actor::RequesterContext;
use crate::domain::entity::{Attachment, Justification, WorkflowEntity};
use crate::domain::status::{ChainScope, EntityStatus};
use crate::errors::{DomainError, PolicyViolation, TransitionError};
use crate::flows::engine::{notify_active, pending_status, resolve_chain, WorkflowEngine};
use crate::flows::states::{TransitionOutcome, WorkflowTrigger};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JustificationSubmission {
    pub notes: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl WorkflowEngine {
    /// Opens the post-disbursement justification chain. Decisions on it go through
    /// [`WorkflowEngine::apply_decision`]; a rejection re-enters the edit policy.
    pub fn start_justification<D>(
        &self,
        directory: &D,
        entity: &mut WorkflowEntity,
        requester: &RequesterContext,
        submission: JustificationSubmission,
    ) -> Result<TransitionOutcome, DomainError>
    where
        D: ApproverDirectory,
    {
        if !entity.is_owned_by(&requester.user_id) {
            return Err(PolicyViolation::NotOwner { operation: "justify" }.into());
        }

        let definition = self.catalog().definition(entity.kind);
        if !definition.supports_justification() || entity.status != EntityStatus::FullyDisbursed {
            return Err(TransitionError::StatusNotAllowed {
                operation: "submit a justification",
                status: entity.rendered_status(),
            }
            .into());
        }

        let notes = submission.notes.trim().to_owned();
        if notes.is_empty() {
            return Err(DomainError::InvalidInput("justification notes are required".to_owned()));
        }

        let chain =
            resolve_chain(directory, definition, ChainScope::Justification, &entity.owner.user_id)?;
        let to = pending_status(&chain, ChainScope::Justification)?;
        let actions = notify_active(&chain, ChainScope::Justification);

        let from = entity.status.clone();
        let at = Utc::now();
        entity.justification =
            Some(Justification { notes, attachments: submission.attachments, submitted_at: at, chain });
        entity.status = to.clone();
        entity.updated_at = at;

        Ok(TransitionOutcome {
            entity_id: entity.id.clone(),
            kind: entity.kind,
            from: Some(from),
            to,
            trigger: WorkflowTrigger::JustificationSubmitted,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::JustificationSubmission;
    use crate::domain::chain::StepStatus;
    use crate::domain::entity::{EntityChanges, WorkflowEntity};
    use crate::domain::status::{ChainScope, EntityStatus};
    use crate::errors::{DomainError, PolicyViolation, TransitionError};
    use crate::flows::policy::{can_delete, can_edit, EditRequest};
    use crate::flows::states::WorkflowAction;
    use crate::flows::testing::{
        approve, approved_cash_request, directory, engine, fully_disbursed_cash_request, reject,
        requester,
    };

    fn receipts() -> JustificationSubmission {
        JustificationSubmission { notes: "Hotel and fuel receipts".to_owned(), attachments: Vec::new() }
    }

    fn justified() -> WorkflowEntity {
        let mut entity = fully_disbursed_cash_request(2_500);
        engine()
            .start_justification(&directory(), &mut entity, &requester("u-staff", "staff"), receipts())
            .expect("start justification");
        entity
    }

    #[test]
    fn justification_opens_its_own_chain() {
        let entity = justified();

        assert_eq!(entity.rendered_status(), "justification_pending_supervisor");
        assert_eq!(entity.status.active_scope(), Some(ChainScope::Justification));
        let chain = &entity.justification.as_ref().expect("justification").chain;
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.active_level(), Some(1));
        assert!(entity.approval_chain.is_fully_approved());
    }

    #[test]
    fn approving_the_justification_chain_completes_the_request() {
        let engine = engine();
        let mut entity = justified();

        approve(&engine, &mut entity, "u-lead", 1).expect("supervisor approves receipts");
        assert_eq!(entity.rendered_status(), "justification_pending_finance");

        let outcome = approve(&engine, &mut entity, "u-fin", 2).expect("finance approves receipts");
        assert_eq!(entity.status, EntityStatus::Completed);
        assert!(outcome.actions.contains(&WorkflowAction::CloseRequest));
        assert!(!can_delete(&entity, &entity.owner.user_id));
    }

    #[test]
    fn rejected_justification_is_resubmitted_through_the_edit_policy() {
        let engine = engine();
        let mut entity = justified();

        reject(&engine, &mut entity, "u-lead", 1, Some("receipts are illegible")).expect("reject");
        assert_eq!(entity.rendered_status(), "justification_rejected");
        assert!(can_edit(&entity, &entity.owner.user_id));

        let review_chain = entity.approval_chain.clone();
        engine
            .submit_edit(&directory(), &mut entity, &requester("u-staff", "staff"), EditRequest {
                changes: EntityChanges {
                    justification_notes: Some("Scanned receipts attached".to_owned()),
                    ..EntityChanges::default()
                },
                reason: "rescanned receipts".to_owned(),
            })
            .expect("resubmit justification");

        assert_eq!(entity.rendered_status(), "justification_pending_supervisor");
        let justification = entity.justification.as_ref().expect("justification");
        assert_eq!(justification.notes, "Scanned receipts attached");
        assert!(justification.chain.steps().iter().all(|step| step.status == StepStatus::Pending));
        assert_eq!(entity.approval_chain, review_chain);
        assert_eq!(entity.total_edits(), 1);
        assert_eq!(entity.edit_history[0].previous_status, "justification_rejected");
        assert!(entity.amount_approved.is_some());
    }

    #[test]
    fn justification_requires_full_disbursement_and_ownership() {
        let engine = engine();
        let mut approved = approved_cash_request(2_500);
        assert!(matches!(
            engine.start_justification(&directory(), &mut approved, &requester("u-staff", "staff"), receipts()),
            Err(DomainError::InvalidTransition(TransitionError::StatusNotAllowed { .. }))
        ));

        let mut disbursed = fully_disbursed_cash_request(2_500);
        assert!(matches!(
            engine.start_justification(&directory(), &mut disbursed, &requester("u-lead", "supervisor"), receipts()),
            Err(DomainError::PolicyViolation(PolicyViolation::NotOwner { .. }))
        ));

        let blank = JustificationSubmission { notes: "  ".to_owned(), attachments: Vec::new() };
        assert!(matches!(
            engine.start_justification(&directory(), &mut disbursed, &requester("u-staff", "staff"), blank),
            Err(DomainError::InvalidInput(_))
        ));
        assert_eq!(disbursed.rendered_status(), "fully_disbursed");
    }
}
