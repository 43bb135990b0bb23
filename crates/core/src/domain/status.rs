use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::Role;

const PENDING_PREFIX: &str = "pending_";
const JUSTIFICATION_PENDING_PREFIX: &str = "justification_pending_";
const JUSTIFICATION_REJECTED: &str = "justification_rejected";
const PARTIALLY_DISBURSED: &str = "partially_disbursed";
const FULLY_DISBURSED: &str = "fully_disbursed";
const COMPLETED: &str = "completed";

/// Which approval chain of an entity a status refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainScope {
    Review,
    Justification,
}

impl ChainScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Justification => "justification",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "review" => Some(Self::Review),
            "justification" => Some(Self::Justification),
            _ => None,
        }
    }
}

/// Lifecycle position of a workflow entity.
///
/// Internally phases are a tagged union; the legacy string form (`pending_finance`,
/// `justification_rejected`, ...) only exists at the storage and API boundary and is produced
/// with [`EntityStatus::render`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EntityStatus {
    Pending { scope: ChainScope, role: Role },
    Rejected { scope: ChainScope },
    Approved,
    PartiallyDisbursed,
    FullyDisbursed,
    Completed,
}

/// Kind-specific names for the review chain's terminal statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusVocabulary {
    pub approved: &'static str,
    pub rejected: &'static str,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("unknown status `{0}`")]
    Unknown(String),
    #[error("status `{0}` does not name an approver role")]
    MissingRole(String),
}

impl EntityStatus {
    pub fn pending(scope: ChainScope, role: Role) -> Self {
        Self::Pending { scope, role }
    }

    /// Scope of the chain currently waiting for a decision, if any.
    pub fn active_scope(&self) -> Option<ChainScope> {
        match self {
            Self::Pending { scope, .. } => Some(*scope),
            _ => None,
        }
    }

    pub fn rejected_scope(&self) -> Option<ChainScope> {
        match self {
            Self::Rejected { scope } => Some(*scope),
            _ => None,
        }
    }

    pub fn is_terminal_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn render(&self, vocabulary: &StatusVocabulary) -> String {
        match self {
            Self::Pending { scope: ChainScope::Review, role } => format!("{PENDING_PREFIX}{role}"),
            Self::Pending { scope: ChainScope::Justification, role } => {
                format!("{JUSTIFICATION_PENDING_PREFIX}{role}")
            }
            Self::Rejected { scope: ChainScope::Review } => vocabulary.rejected.to_owned(),
            Self::Rejected { scope: ChainScope::Justification } => {
                JUSTIFICATION_REJECTED.to_owned()
            }
            Self::Approved => vocabulary.approved.to_owned(),
            Self::PartiallyDisbursed => PARTIALLY_DISBURSED.to_owned(),
            Self::FullyDisbursed => FULLY_DISBURSED.to_owned(),
            Self::Completed => COMPLETED.to_owned(),
        }
    }

    pub fn parse(raw: &str, vocabulary: &StatusVocabulary) -> Result<Self, StatusParseError> {
        let raw = raw.trim();

        if raw == vocabulary.approved {
            return Ok(Self::Approved);
        }
        if raw == vocabulary.rejected {
            return Ok(Self::Rejected { scope: ChainScope::Review });
        }

        match raw {
            JUSTIFICATION_REJECTED => {
                return Ok(Self::Rejected { scope: ChainScope::Justification });
            }
            PARTIALLY_DISBURSED => return Ok(Self::PartiallyDisbursed),
            FULLY_DISBURSED => return Ok(Self::FullyDisbursed),
            COMPLETED => return Ok(Self::Completed),
            _ => {}
        }

        let (scope, role) = if let Some(role) = raw.strip_prefix(JUSTIFICATION_PENDING_PREFIX) {
            (ChainScope::Justification, role)
        } else if let Some(role) = raw.strip_prefix(PENDING_PREFIX) {
            (ChainScope::Review, role)
        } else {
            return Err(StatusParseError::Unknown(raw.to_owned()));
        };

        if role.is_empty() {
            return Err(StatusParseError::MissingRole(raw.to_owned()));
        }

        Ok(Self::Pending { scope, role: Role::new(role) })
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainScope, EntityStatus, StatusParseError, StatusVocabulary};
    use crate::domain::actor::Role;

    const CASH: StatusVocabulary = StatusVocabulary { approved: "approved", rejected: "denied" };
    const CONTRACT: StatusVocabulary = StatusVocabulary { approved: "active", rejected: "rejected" };

    #[test]
    fn renders_legacy_strings() {
        let cases = [
            (EntityStatus::pending(ChainScope::Review, Role::supervisor()), "pending_supervisor"),
            (
                EntityStatus::pending(ChainScope::Justification, Role::finance()),
                "justification_pending_finance",
            ),
            (EntityStatus::Rejected { scope: ChainScope::Review }, "denied"),
            (EntityStatus::Rejected { scope: ChainScope::Justification }, "justification_rejected"),
            (EntityStatus::Approved, "approved"),
            (EntityStatus::PartiallyDisbursed, "partially_disbursed"),
            (EntityStatus::FullyDisbursed, "fully_disbursed"),
            (EntityStatus::Completed, "completed"),
        ];

        for (status, expected) in cases {
            assert_eq!(status.render(&CASH), expected);
            assert_eq!(EntityStatus::parse(expected, &CASH).expect("parse"), status);
        }
    }

    #[test]
    fn vocabulary_changes_terminal_names() {
        assert_eq!(EntityStatus::Approved.render(&CONTRACT), "active");
        assert_eq!(
            EntityStatus::parse("rejected", &CONTRACT).expect("parse"),
            EntityStatus::Rejected { scope: ChainScope::Review }
        );
        assert!(EntityStatus::parse("denied", &CONTRACT).is_err());
    }

    #[test]
    fn legacy_single_tranche_vocabulary_is_not_accepted() {
        assert_eq!(
            EntityStatus::parse("disbursed", &CASH),
            Err(StatusParseError::Unknown("disbursed".to_owned()))
        );
    }

    #[test]
    fn pending_without_role_is_rejected() {
        assert_eq!(
            EntityStatus::parse("pending_", &CASH),
            Err(StatusParseError::MissingRole("pending_".to_owned()))
        );
    }

    #[test]
    fn multi_word_roles_survive_parsing() {
        let status = EntityStatus::parse("pending_head_of_business", &CASH).expect("parse");
        assert_eq!(status, EntityStatus::pending(ChainScope::Review, Role::new("head_of_business")));
        assert_eq!(status.active_scope(), Some(ChainScope::Review));
    }
}
