//! Shared fixtures for workflow tests.

use rust_decimal::Decimal;

use crate::approvals::{DirectoryEntry, InMemoryApproverDirectory};
use crate::domain::actor::{RequesterContext, Role, UserId};
use crate::domain::chain::Decision;
use crate::domain::entity::{EntityDraft, EntityKind, WorkflowEntity};
use crate::errors::DomainError;
use crate::flows::definition::WorkflowCatalog;
use crate::flows::disbursement::DisbursementRequest;
use crate::flows::engine::{DecisionCommand, WorkflowEngine};
use crate::flows::states::TransitionOutcome;

fn entry(user_id: &str, role: &str, department: &str, manager: Option<&str>) -> DirectoryEntry {
    DirectoryEntry {
        user_id: UserId::new(user_id),
        name: format!("{user_id} name"),
        role: Role::new(role),
        department: department.to_owned(),
        manager_id: manager.map(UserId::new),
    }
}

pub(crate) fn directory() -> InMemoryApproverDirectory {
    InMemoryApproverDirectory::new(vec![
        entry("u-staff", "staff", "operations", Some("u-lead")),
        entry("u-lead", "supervisor", "operations", Some("u-head")),
        entry("u-other-sup", "supervisor", "operations", Some("u-head")),
        entry("u-head", "executive", "operations", None),
        entry("u-fin", "finance", "finance", Some("u-head")),
        entry("u-legal", "legal", "legal", Some("u-head")),
        entry("u-buyer", "supply_chain", "procurement", Some("u-head")),
    ])
}

pub(crate) fn requester(user_id: &str, role: &str) -> RequesterContext {
    RequesterContext::new(user_id, role)
}

pub(crate) fn engine() -> WorkflowEngine {
    WorkflowEngine::new(WorkflowCatalog::default(), true)
}

/// Cash request opened by `u-staff`: supervisor `u-lead`, finance `u-fin`.
pub(crate) fn cash_request(amount: i64) -> (WorkflowEntity, TransitionOutcome) {
    let draft = EntityDraft {
        kind: EntityKind::CashRequest,
        title: "Site visit float".to_owned(),
        description: "Travel and accommodation".to_owned(),
        amount_requested: Some(Decimal::from(amount)),
        attachments: Vec::new(),
        details: serde_json::json!({ "urgency": "normal" }),
    };

    match engine().open(&directory(), &requester("u-staff", "staff"), draft) {
        Ok(opened) => opened,
        Err(error) => panic!("fixture cash request should open: {error}"),
    }
}

pub(crate) fn approve(
    engine: &WorkflowEngine,
    entity: &mut WorkflowEntity,
    user_id: &str,
    level: u32,
) -> Result<TransitionOutcome, DomainError> {
    engine.apply_decision(entity, &requester(user_id, "approver"), DecisionCommand {
        level,
        decision: Decision::Approve,
        comments: None,
        approved_amount: None,
    })
}

pub(crate) fn reject(
    engine: &WorkflowEngine,
    entity: &mut WorkflowEntity,
    user_id: &str,
    level: u32,
    comments: Option<&str>,
) -> Result<TransitionOutcome, DomainError> {
    engine.apply_decision(entity, &requester(user_id, "approver"), DecisionCommand {
        level,
        decision: Decision::Reject,
        comments: comments.map(str::to_owned),
        approved_amount: None,
    })
}

/// Cash request for `amount` that both reviewers approved in full.
pub(crate) fn approved_cash_request(amount: i64) -> WorkflowEntity {
    let engine = engine();
    let (mut entity, _) = cash_request(amount);
    for (user_id, level) in [("u-lead", 1), ("u-fin", 2)] {
        if let Err(error) = approve(&engine, &mut entity, user_id, level) {
            panic!("fixture approval at level {level} failed: {error}");
        }
    }
    entity
}

pub(crate) fn disburse(
    engine: &WorkflowEngine,
    entity: &mut WorkflowEntity,
    amount: i64,
) -> Result<TransitionOutcome, DomainError> {
    engine.record_disbursement(entity, &requester("u-fin", "finance"), DisbursementRequest {
        amount: Decimal::from(amount),
        notes: None,
    })
}

/// Cash request whose approved amount has been paid out in one tranche.
pub(crate) fn fully_disbursed_cash_request(amount: i64) -> WorkflowEntity {
    let engine = engine();
    let mut entity = approved_cash_request(amount);
    if let Err(error) = disburse(&engine, &mut entity, amount) {
        panic!("fixture disbursement failed: {error}");
    }
    entity
}
