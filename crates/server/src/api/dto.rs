//! Wire shapes of the JSON API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procura_core::flows::{can_delete, can_edit};
use procura_core::{
    ApprovalChain, ApprovalStep, Attachment, Disbursement, EditRecord, EntityKind, UserId,
    WorkflowEntity,
};
use procura_db::EntityFilter;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub level: u32,
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub department: String,
    pub status: &'static str,
    pub comments: Option<String>,
    pub action_date: Option<String>,
    pub action_time: Option<String>,
}

impl From<&ApprovalStep> for StepView {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            level: step.level,
            user_id: step.approver.user_id.to_string(),
            name: step.approver.name.clone(),
            role: step.approver.role.as_str().to_owned(),
            department: step.approver.department.clone(),
            status: step.status.as_str(),
            comments: step.comments.clone(),
            action_date: step.action_date(),
            action_time: step.action_time(),
        }
    }
}

fn chain_view(chain: &ApprovalChain) -> Vec<StepView> {
    chain.steps().iter().map(StepView::from).collect()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JustificationView {
    pub notes: String,
    pub attachments: Vec<Attachment>,
    pub submitted_at: DateTime<Utc>,
    pub approval_chain: Vec<StepView>,
}

/// Entity as returned to a specific requester.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub id: String,
    pub kind: EntityKind,
    pub owner_id: String,
    pub owner_name: String,
    pub department: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub approval_chain: Vec<StepView>,
    pub current_level: Option<u32>,
    pub amount_requested: Option<Decimal>,
    pub amount_approved: Option<Decimal>,
    pub disbursements: Vec<Disbursement>,
    pub total_disbursed: Decimal,
    pub remaining_balance: Option<Decimal>,
    pub justification: Option<JustificationView>,
    pub attachments: Vec<Attachment>,
    pub details: serde_json::Value,
    pub is_edited: bool,
    pub total_edits: usize,
    pub edit_history: Vec<EditRecord>,
    pub can_edit: bool,
    pub can_delete: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn for_requester(entity: &WorkflowEntity, requester: &UserId) -> Self {
        Self {
            id: entity.id.0.clone(),
            kind: entity.kind,
            owner_id: entity.owner.user_id.to_string(),
            owner_name: entity.owner.name.clone(),
            department: entity.owner.department.clone(),
            title: entity.title.clone(),
            description: entity.description.clone(),
            status: entity.rendered_status(),
            approval_chain: chain_view(&entity.approval_chain),
            current_level: entity.active_chain().and_then(ApprovalChain::active_level),
            amount_requested: entity.amount_requested,
            amount_approved: entity.amount_approved,
            disbursements: entity.disbursements.clone(),
            total_disbursed: entity.total_disbursed(),
            remaining_balance: entity.remaining_balance(),
            justification: entity.justification.as_ref().map(|justification| JustificationView {
                notes: justification.notes.clone(),
                attachments: justification.attachments.clone(),
                submitted_at: justification.submitted_at,
                approval_chain: chain_view(&justification.chain),
            }),
            attachments: entity.attachments.clone(),
            details: entity.details.clone(),
            is_edited: entity.is_edited(),
            total_edits: entity.total_edits(),
            edit_history: entity.edit_history.clone(),
            can_edit: can_edit(entity, requester),
            can_delete: can_delete(entity, requester),
            version: entity.version,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    pub kind: Option<String>,
    pub status: Option<String>,
    pub owner: Option<String>,
}

impl ListQuery {
    pub fn into_filter(self) -> Result<EntityFilter, String> {
        let kind = match self.kind.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                Some(EntityKind::parse(raw).ok_or_else(|| format!("unknown entity kind `{raw}`"))?)
            }
            None => None,
        };
        Ok(EntityFilter {
            kind,
            status: self.status.filter(|status| !status.trim().is_empty()),
            owner: self.owner.filter(|owner| !owner.trim().is_empty()).map(UserId::new),
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub id: String,
    pub deleted: bool,
}
