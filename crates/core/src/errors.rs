use rust_decimal::Decimal;
use thiserror::Error;

use crate::approvals::RoutingError;
use crate::domain::chain::ChainError;
use crate::domain::status::StatusParseError;

/// Why a requested state change cannot be applied to the entity as it stands.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("entity in status `{status}` has no approval step awaiting a decision")]
    NoActiveChain { status: String },
    #[error("approval step {level} was already acted upon by an approver ({status})")]
    StepAlreadyDecided { level: u32, status: &'static str },
    #[error("approval step {requested} is not the active step (active: {active})")]
    LevelNotActive { requested: u32, active: String },
    #[error("a rejection must carry comments")]
    CommentsRequired,
    #[error("operation `{operation}` is not allowed while status is `{status}`")]
    StatusNotAllowed { operation: &'static str, status: String },
    #[error("entity kind `{kind}` does not support disbursements")]
    NotDisbursable { kind: &'static str },
}

/// Why the requester is not allowed to do what they asked.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("approval step {level} is assigned to `{assigned}`, not `{requester}`")]
    NotAssignedApprover { level: u32, assigned: String, requester: String },
    #[error("only the owner may {operation} this entity")]
    NotOwner { operation: &'static str },
    #[error("role `{actual}` may not {operation}; `{required}` is required")]
    RoleRequired { operation: &'static str, required: String, actual: String },
    #[error("entity can no longer be deleted once review has started")]
    ReviewStarted,
    #[error("entity is not open for edits in status `{status}`")]
    NotEditable { status: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),
    #[error("disbursement of {requested} exceeds the remaining balance of {remaining}")]
    OverDisbursement { requested: Decimal, remaining: Decimal },
    #[error("{resource} `{id}` was not found")]
    NotFound { resource: &'static str, id: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("approver unavailable: {0}")]
    ApproverUnavailable(#[from] RoutingError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<ChainError> for DomainError {
    fn from(value: ChainError) -> Self {
        match value {
            ChainError::UnknownLevel { level } => {
                Self::NotFound { resource: "approval step", id: level.to_string() }
            }
            ChainError::StepAlreadyDecided { level, status } => {
                TransitionError::StepAlreadyDecided { level, status: status.as_str() }.into()
            }
            ChainError::LevelNotActive { requested, active } => TransitionError::LevelNotActive {
                requested,
                active: active.map_or_else(|| "none".to_owned(), |level| level.to_string()),
            }
            .into(),
            other @ (ChainError::Empty
            | ChainError::NonContiguousLevel { .. }
            | ChainError::BrokenOrdering { .. }) => Self::InvariantViolation(other.to_string()),
        }
    }
}

impl From<StatusParseError> for DomainError {
    fn from(value: StatusParseError) -> Self {
        Self::InvariantViolation(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("entity `{entity_id}` was modified concurrently (expected version {expected_version})")]
    Conflict { entity_id: String, expected_version: i64 },
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record is not in a state that allows this action. Reload and try again."
            }
            Self::Unprocessable { .. } => "No eligible approver could be assigned.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Stable machine-readable kind used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "invalid_input",
            Self::Forbidden { .. } => "policy_violation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Unprocessable { .. } => "approver_unavailable",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Unprocessable { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Domain(DomainError::InvalidInput(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::PolicyViolation(_)) => {
                Self::Forbidden { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::NotFound { .. }) => {
                Self::NotFound { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::InvalidTransition(_))
            | ApplicationError::Domain(DomainError::OverDisbursement { .. })
            | ApplicationError::Conflict { .. } => Self::Conflict { message, correlation_id },
            ApplicationError::Domain(DomainError::ApproverUnavailable(_)) => {
                Self::Unprocessable { message, correlation_id }
            }
            ApplicationError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
            ApplicationError::Domain(DomainError::InvariantViolation(_))
            | ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::chain::{ChainError, StepStatus};
    use crate::errors::{
        ApplicationError, DomainError, InterfaceError, PolicyViolation, TransitionError,
    };

    #[test]
    fn decided_step_maps_to_conflict_with_specific_reason() {
        let domain = DomainError::from(ChainError::StepAlreadyDecided {
            level: 1,
            status: StepStatus::Approved,
        });
        let interface = ApplicationError::from(domain).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Conflict {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert!(interface.message().contains("already acted upon by an approver"));
    }

    #[test]
    fn unknown_level_maps_to_not_found() {
        let domain = DomainError::from(ChainError::UnknownLevel { level: 7 });
        assert_eq!(domain, DomainError::NotFound { resource: "approval step", id: "7".to_owned() });

        let interface = ApplicationError::from(domain).into_interface("req-2");
        assert_eq!(interface.kind(), "not_found");
    }

    #[test]
    fn policy_violation_maps_to_forbidden() {
        let interface = ApplicationError::from(DomainError::from(
            PolicyViolation::NotAssignedApprover {
                level: 2,
                assigned: "u-fin".to_owned(),
                requester: "u-staff".to_owned(),
            },
        ))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.user_message(), "You are not allowed to perform this action.");
    }

    #[test]
    fn over_disbursement_and_stale_version_are_conflicts() {
        let over = ApplicationError::from(DomainError::OverDisbursement {
            requested: Decimal::ONE,
            remaining: Decimal::ZERO,
        })
        .into_interface("req-4");
        assert!(matches!(over, InterfaceError::Conflict { .. }));

        let stale = ApplicationError::Conflict { entity_id: "CR-1".to_owned(), expected_version: 3 }
            .into_interface("req-5");
        assert_eq!(stale.kind(), "conflict");
        assert_eq!(stale.correlation_id(), "req-5");
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let interface =
            ApplicationError::from(DomainError::InvalidInput("amount must be positive".to_owned()))
                .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn comments_required_is_a_transition_error() {
        let domain = DomainError::from(TransitionError::CommentsRequired);
        assert!(matches!(domain, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-7");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid api token".to_owned()).into_interface("req-8");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
