use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{Role, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approver {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub department: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn outcome(self) -> StepStatus {
        match self {
            Self::Approve => StepStatus::Approved,
            Self::Reject => StepStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub level: u32,
    pub approver: Approver,
    pub status: StepStatus,
    pub comments: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
}

impl ApprovalStep {
    pub fn pending(level: u32, approver: Approver) -> Self {
        Self { level, approver, status: StepStatus::Pending, comments: None, acted_at: None }
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    /// `actionDate` as rendered to clients.
    pub fn action_date(&self) -> Option<String> {
        self.acted_at.map(|at| at.format("%Y-%m-%d").to_string())
    }

    /// `actionTime` as rendered to clients.
    pub fn action_time(&self) -> Option<String> {
        self.acted_at.map(|at| at.format("%H:%M:%S").to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("an approval chain needs at least one step")]
    Empty,
    #[error("approval chain levels must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousLevel { expected: u32, found: u32 },
    #[error("approval chain ordering is broken at level {level}")]
    BrokenOrdering { level: u32 },
    #[error("approval step {level} does not exist")]
    UnknownLevel { level: u32 },
    #[error("approval step {level} was already {status:?}")]
    StepAlreadyDecided { level: u32, status: StepStatus },
    #[error("approval step {requested} is not active (active level: {active:?})")]
    LevelNotActive { requested: u32, active: Option<u32> },
}

/// Ordered approval steps for one entity and one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ApprovalStep>", into = "Vec<ApprovalStep>")]
pub struct ApprovalChain {
    steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    /// Builds a fresh chain with every level pending.
    pub fn from_approvers(approvers: Vec<Approver>) -> Result<Self, ChainError> {
        let steps = approvers
            .into_iter()
            .zip(1u32..)
            .map(|(approver, level)| ApprovalStep::pending(level, approver))
            .collect();
        Self::from_steps(steps)
    }

    /// Rehydrates a chain, rejecting anything that breaks level or ordering invariants.
    pub fn from_steps(mut steps: Vec<ApprovalStep>) -> Result<Self, ChainError> {
        if steps.is_empty() {
            return Err(ChainError::Empty);
        }

        steps.sort_by_key(|step| step.level);
        for (expected, step) in (1u32..).zip(&steps) {
            if step.level != expected {
                return Err(ChainError::NonContiguousLevel { expected, found: step.level });
            }
        }

        let chain = Self { steps };
        chain.check_ordering()?;
        Ok(chain)
    }

    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, level: u32) -> Option<&ApprovalStep> {
        level.checked_sub(1).and_then(|index| self.steps.get(index as usize))
    }

    pub fn first(&self) -> Option<&ApprovalStep> {
        self.steps.first()
    }

    pub fn last_level(&self) -> u32 {
        self.steps.last().map(|step| step.level).unwrap_or(0)
    }

    /// The first pending step, provided nothing in the chain has been rejected.
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        if self.is_rejected() {
            return None;
        }
        self.steps.iter().find(|step| step.is_pending())
    }

    pub fn active_level(&self) -> Option<u32> {
        self.active_step().map(|step| step.level)
    }

    pub fn is_rejected(&self) -> bool {
        self.steps.iter().any(|step| step.status == StepStatus::Rejected)
    }

    pub fn is_fully_approved(&self) -> bool {
        self.steps.iter().all(|step| step.status == StepStatus::Approved)
    }

    /// Every step before the first non-approved step is approved, at most one step is
    /// rejected, and every step after the first non-approved step is still pending.
    pub fn check_ordering(&self) -> Result<(), ChainError> {
        let mut frontier_passed = false;
        for step in &self.steps {
            match (frontier_passed, step.status) {
                (false, StepStatus::Approved) => {}
                (false, StepStatus::Pending) | (false, StepStatus::Rejected) => {
                    frontier_passed = true;
                }
                (true, StepStatus::Pending) => {}
                (true, _) => return Err(ChainError::BrokenOrdering { level: step.level }),
            }
        }
        Ok(())
    }

    /// Confirms `level` may receive a decision right now without changing anything.
    pub fn ensure_decidable(&self, level: u32) -> Result<&ApprovalStep, ChainError> {
        let step = self.step(level).ok_or(ChainError::UnknownLevel { level })?;
        if !step.is_pending() {
            return Err(ChainError::StepAlreadyDecided { level, status: step.status });
        }

        let active = self.active_level();
        if active != Some(level) {
            return Err(ChainError::LevelNotActive { requested: level, active });
        }

        Ok(step)
    }

    /// Moves exactly one step out of `pending`. Callers validate authorization first.
    pub fn record(
        &mut self,
        level: u32,
        decision: Decision,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&ApprovalStep, ChainError> {
        self.ensure_decidable(level)?;

        let index = (level - 1) as usize;
        let step = &mut self.steps[index];
        step.status = decision.outcome();
        step.comments = comments;
        step.acted_at = Some(at);

        Ok(&self.steps[index])
    }
}

impl TryFrom<Vec<ApprovalStep>> for ApprovalChain {
    type Error = ChainError;

    fn try_from(value: Vec<ApprovalStep>) -> Result<Self, Self::Error> {
        Self::from_steps(value)
    }
}

impl From<ApprovalChain> for Vec<ApprovalStep> {
    fn from(value: ApprovalChain) -> Self {
        value.steps
    }
}
