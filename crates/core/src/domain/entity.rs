use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Owner, UserId};
use crate::domain::chain::ApprovalChain;
use crate::domain::status::{ChainScope, EntityStatus, StatusVocabulary};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn generate(kind: EntityKind) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", kind.id_prefix(), &suffix[..12]))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CashRequest,
    SupplierApplication,
    Contract,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] =
        [EntityKind::CashRequest, EntityKind::SupplierApplication, EntityKind::Contract];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashRequest => "cash_request",
            Self::SupplierApplication => "supplier_application",
            Self::Contract => "contract",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
    }

    pub fn vocabulary(&self) -> StatusVocabulary {
        match self {
            Self::CashRequest => StatusVocabulary { approved: "approved", rejected: "denied" },
            Self::SupplierApplication => {
                StatusVocabulary { approved: "approved", rejected: "rejected" }
            }
            Self::Contract => StatusVocabulary { approved: "active", rejected: "rejected" },
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            Self::CashRequest => "CR",
            Self::SupplierApplication => "SUP",
            Self::Contract => "CON",
        }
    }
}

/// Reference to a document held by the external file service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mimetype: String,
    pub size: u64,
    pub public_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disbursement {
    pub disbursement_number: u32,
    pub amount: Decimal,
    pub notes: Option<String>,
    pub disbursed_by: UserId,
    pub date: DateTime<Utc>,
}

/// Field-level patch submitted with a resubmission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount_requested: Option<Decimal>,
    pub attachments: Option<Vec<Attachment>>,
    pub details: Option<serde_json::Value>,
    pub justification_notes: Option<String>,
    pub justification_attachments: Option<Vec<Attachment>>,
}

impl EntityChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    pub edit_number: u32,
    pub edited_at: DateTime<Utc>,
    pub edited_by: UserId,
    /// Rendered status the entity held when the edit was submitted.
    pub previous_status: String,
    pub reason: String,
    pub changes: EntityChanges,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Justification {
    pub notes: String,
    pub attachments: Vec<Attachment>,
    pub submitted_at: DateTime<Utc>,
    pub chain: ApprovalChain,
}

/// Input for opening a new entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDraft {
    pub kind: EntityKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount_requested: Option<Decimal>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Owner,
    pub title: String,
    pub description: String,
    pub status: EntityStatus,
    pub approval_chain: ApprovalChain,
    pub amount_requested: Option<Decimal>,
    pub amount_approved: Option<Decimal>,
    pub disbursements: Vec<Disbursement>,
    pub edit_history: Vec<EditRecord>,
    pub justification: Option<Justification>,
    pub attachments: Vec<Attachment>,
    pub details: serde_json::Value,
    /// Latched the first time review step 1 leaves `pending`; never cleared.
    pub review_started: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowEntity {
    pub fn rendered_status(&self) -> String {
        self.status.render(&self.kind.vocabulary())
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner.user_id == user_id
    }

    pub fn total_edits(&self) -> usize {
        self.edit_history.len()
    }

    pub fn is_edited(&self) -> bool {
        self.total_edits() > 0
    }

    pub fn total_disbursed(&self) -> Decimal {
        self.disbursements.iter().map(|disbursement| disbursement.amount).sum()
    }

    pub fn remaining_balance(&self) -> Option<Decimal> {
        self.amount_approved.map(|approved| approved - self.total_disbursed())
    }

    pub fn chain(&self, scope: ChainScope) -> Option<&ApprovalChain> {
        match scope {
            ChainScope::Review => Some(&self.approval_chain),
            ChainScope::Justification => self.justification.as_ref().map(|j| &j.chain),
        }
    }

    pub fn chain_mut(&mut self, scope: ChainScope) -> Option<&mut ApprovalChain> {
        match scope {
            ChainScope::Review => Some(&mut self.approval_chain),
            ChainScope::Justification => self.justification.as_mut().map(|j| &mut j.chain),
        }
    }

    /// The chain currently waiting on a decision, derived from the status scope.
    pub fn active_chain(&self) -> Option<&ApprovalChain> {
        self.status.active_scope().and_then(|scope| self.chain(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityChanges, EntityId, EntityKind};

    #[test]
    fn kinds_round_trip_through_their_keys() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("purchase_order"), None);
    }

    #[test]
    fn generated_ids_carry_kind_prefix() {
        let id = EntityId::generate(EntityKind::CashRequest);
        assert!(id.0.starts_with("CR-"));
        assert_eq!(id.0.len(), "CR-".len() + 12);
        assert_ne!(id, EntityId::generate(EntityKind::CashRequest));
    }

    #[test]
    fn empty_changes_are_detected() {
        assert!(EntityChanges::default().is_empty());
        let changes: EntityChanges =
            serde_json::from_str(r#"{"amountRequested": "5000"}"#).expect("changes json");
        assert!(!changes.is_empty());
    }
}
