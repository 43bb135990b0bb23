use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::RequesterContext;
use crate::domain::entity::{Disbursement, WorkflowEntity};
use crate::domain::status::EntityStatus;
use crate::errors::{DomainError, PolicyViolation, TransitionError};
use crate::flows::engine::WorkflowEngine;
use crate::flows::states::{TransitionOutcome, WorkflowAction, WorkflowTrigger};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WorkflowEngine {
    /// Pays out one tranche of the approved amount.
    pub fn record_disbursement(
        &self,
        entity: &mut WorkflowEntity,
        requester: &RequesterContext,
        request: DisbursementRequest,
    ) -> Result<TransitionOutcome, DomainError> {
        let definition = self.catalog().definition(entity.kind);
        let disbursing_role = definition
            .disbursing_role
            .as_ref()
            .ok_or(TransitionError::NotDisbursable { kind: entity.kind.as_str() })?;

        if &requester.role != disbursing_role {
            return Err(PolicyViolation::RoleRequired {
                operation: "disburse funds",
                required: disbursing_role.to_string(),
                actual: requester.role.to_string(),
            }
            .into());
        }

        // A fully disbursed entity falls through to the balance check below and reports the
        // attempt as an over-disbursement.
        let open_for_tranches = matches!(
            entity.status,
            EntityStatus::Approved | EntityStatus::PartiallyDisbursed | EntityStatus::FullyDisbursed
        );
        if !open_for_tranches {
            return Err(TransitionError::StatusNotAllowed {
                operation: "disburse",
                status: entity.rendered_status(),
            }
            .into());
        }

        if request.amount <= Decimal::ZERO {
            return Err(DomainError::InvalidInput(
                "disbursement amount must be greater than zero".to_owned(),
            ));
        }

        let approved = entity.amount_approved.ok_or_else(|| {
            DomainError::InvariantViolation("approved entity has no approved amount".to_owned())
        })?;
        let remaining = approved - entity.total_disbursed();
        if request.amount > remaining {
            return Err(DomainError::OverDisbursement { requested: request.amount, remaining });
        }

        let from = entity.status.clone();
        let disbursement_number = u32::try_from(entity.disbursements.len())
            .map_err(|_| DomainError::InvariantViolation("too many disbursements".to_owned()))?
            + 1;
        let at = Utc::now();
        entity.disbursements.push(Disbursement {
            disbursement_number,
            amount: request.amount,
            notes: request.notes.filter(|notes| !notes.trim().is_empty()),
            disbursed_by: requester.user_id.clone(),
            date: at,
        });

        let mut actions = vec![WorkflowAction::NotifyOwner { user_id: entity.owner.user_id.clone() }];
        let to = if entity.total_disbursed() == approved {
            if definition.supports_justification() {
                actions.push(WorkflowAction::UnlockJustification);
            }
            EntityStatus::FullyDisbursed
        } else {
            EntityStatus::PartiallyDisbursed
        };
        entity.status = to.clone();
        entity.updated_at = at;

        Ok(TransitionOutcome {
            entity_id: entity.id.clone(),
            kind: entity.kind,
            from: Some(from),
            to,
            trigger: WorkflowTrigger::Disbursed { disbursement_number, amount: request.amount },
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::DisbursementRequest;
    use crate::domain::entity::EntityKind;
    use crate::domain::status::EntityStatus;
    use crate::errors::{DomainError, PolicyViolation, TransitionError};
    use crate::flows::states::WorkflowAction;
    use crate::flows::testing::{
        approved_cash_request, cash_request, directory, disburse, engine, requester,
    };

    #[test]
    fn scenario_d_tranches_until_fully_disbursed() {
        let engine = engine();
        let mut entity = approved_cash_request(10_000);
        assert_eq!(entity.amount_approved, Some(Decimal::from(10_000)));

        disburse(&engine, &mut entity, 4_000).expect("first tranche");
        assert_eq!(entity.status, EntityStatus::PartiallyDisbursed);
        assert_eq!(entity.rendered_status(), "partially_disbursed");

        let outcome = disburse(&engine, &mut entity, 6_000).expect("second tranche");
        assert_eq!(entity.rendered_status(), "fully_disbursed");
        assert!(outcome.actions.contains(&WorkflowAction::UnlockJustification));

        let numbered: Vec<(u32, Decimal)> = entity
            .disbursements
            .iter()
            .map(|disbursement| (disbursement.disbursement_number, disbursement.amount))
            .collect();
        assert_eq!(numbered, vec![(1, Decimal::from(4_000)), (2, Decimal::from(6_000))]);

        let error = disburse(&engine, &mut entity, 1).expect_err("nothing left");
        assert_eq!(
            error,
            DomainError::OverDisbursement { requested: Decimal::ONE, remaining: Decimal::ZERO }
        );
        assert_eq!(entity.disbursements.len(), 2);
    }

    #[test]
    fn tranche_above_remaining_balance_is_over_disbursement() {
        let engine = engine();
        let mut entity = approved_cash_request(10_000);
        disburse(&engine, &mut entity, 4_000).expect("first tranche");
        let before = entity.clone();

        let error = disburse(&engine, &mut entity, 6_001).expect_err("over the balance");
        assert_eq!(
            error,
            DomainError::OverDisbursement {
                requested: Decimal::from(6_001),
                remaining: Decimal::from(6_000),
            }
        );
        assert_eq!(entity, before);
    }

    #[test]
    fn only_finance_disburses() {
        let engine = engine();
        let mut entity = approved_cash_request(10_000);

        let error = engine
            .record_disbursement(&mut entity, &requester("u-lead", "supervisor"), DisbursementRequest {
                amount: Decimal::from(100),
                notes: None,
            })
            .expect_err("supervisor cannot disburse");
        assert!(matches!(
            error,
            DomainError::PolicyViolation(PolicyViolation::RoleRequired { .. })
        ));
        assert!(entity.disbursements.is_empty());
    }

    #[test]
    fn amount_must_be_positive_and_status_approved() {
        let engine = engine();
        let (mut pending, _) = cash_request(10_000);
        assert!(matches!(
            disburse(&engine, &mut pending, 100),
            Err(DomainError::InvalidTransition(TransitionError::StatusNotAllowed { .. }))
        ));

        let mut approved = approved_cash_request(10_000);
        assert!(matches!(
            disburse(&engine, &mut approved, 0),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_disbursable_kinds_are_refused() {
        let engine = engine();
        let (mut supplier, _) = engine
            .open(&directory(), &requester("u-staff", "staff"), crate::domain::entity::EntityDraft {
                kind: EntityKind::SupplierApplication,
                title: "Acme Ltd onboarding".to_owned(),
                description: String::new(),
                amount_requested: None,
                attachments: Vec::new(),
                details: serde_json::Value::Null,
            })
            .expect("open supplier application");

        assert!(matches!(
            disburse(&engine, &mut supplier, 100),
            Err(DomainError::InvalidTransition(TransitionError::NotDisbursable { .. }))
        ));
    }
}
