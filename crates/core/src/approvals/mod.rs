//! Approver directory and chain resolution.
//!
//! Chains are resolved in full when an entity is submitted (or resubmitted): every role in the
//! definition's sequence is bound to one concrete person up front and never re-routed later.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{Role, UserId};
use crate::domain::chain::Approver;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub department: String,
    pub manager_id: Option<UserId>,
}

impl DirectoryEntry {
    fn as_approver(&self, role: &Role) -> Approver {
        Approver {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            role: role.clone(),
            department: self.department.clone(),
        }
    }
}

pub trait ApproverDirectory {
    fn find(&self, user_id: &UserId) -> Option<DirectoryEntry>;
    fn members_with_role(&self, role: &Role) -> Vec<DirectoryEntry>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryApproverDirectory {
    entries_by_user: HashMap<UserId, DirectoryEntry>,
}

impl InMemoryApproverDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        let entries_by_user =
            entries.into_iter().map(|entry| (entry.user_id.clone(), entry)).collect();
        Self { entries_by_user }
    }

    pub fn entries(&self) -> Vec<DirectoryEntry> {
        let mut entries: Vec<DirectoryEntry> = self.entries_by_user.values().cloned().collect();
        entries.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        entries
    }
}

impl ApproverDirectory for InMemoryApproverDirectory {
    fn find(&self, user_id: &UserId) -> Option<DirectoryEntry> {
        self.entries_by_user.get(user_id).cloned()
    }

    fn members_with_role(&self, role: &Role) -> Vec<DirectoryEntry> {
        self.entries_by_user.values().filter(|entry| &entry.role == role).cloned().collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("requester `{user_id}` is not present in the approver directory")]
    UnknownOwner { user_id: UserId },
    #[error("requester `{user_id}` has no manager to act as supervisor")]
    NoManager { user_id: UserId },
    #[error("no eligible approver holds role `{role}` for department `{department}`")]
    NoEligibleApprover { role: Role, department: String },
}

pub struct ChainResolver<'a, D> {
    directory: &'a D,
}

impl<'a, D> ChainResolver<'a, D>
where
    D: ApproverDirectory,
{
    pub fn new(directory: &'a D) -> Self {
        Self { directory }
    }

    /// Binds every role to a person. The supervisor is the owner's direct manager; any other
    /// role goes to a member holding it, never the owner, preferring people not already on
    /// the chain, then the owner's department, then the lowest user id.
    pub fn resolve(&self, owner_id: &UserId, roles: &[Role]) -> Result<Vec<Approver>, RoutingError> {
        let owner = self
            .directory
            .find(owner_id)
            .ok_or_else(|| RoutingError::UnknownOwner { user_id: owner_id.clone() })?;

        let mut approvers: Vec<Approver> = Vec::with_capacity(roles.len());
        for role in roles {
            let entry = if role.as_str() == Role::SUPERVISOR {
                self.supervisor_of(&owner)?
            } else {
                self.member_for(role, &owner, &approvers)?
            };
            approvers.push(entry.as_approver(role));
        }

        Ok(approvers)
    }

    fn supervisor_of(&self, owner: &DirectoryEntry) -> Result<DirectoryEntry, RoutingError> {
        let manager_id = owner
            .manager_id
            .as_ref()
            .filter(|manager_id| *manager_id != &owner.user_id)
            .ok_or_else(|| RoutingError::NoManager { user_id: owner.user_id.clone() })?;

        self.directory.find(manager_id).ok_or_else(|| RoutingError::NoEligibleApprover {
            role: Role::supervisor(),
            department: owner.department.clone(),
        })
    }

    fn member_for(
        &self,
        role: &Role,
        owner: &DirectoryEntry,
        already_assigned: &[Approver],
    ) -> Result<DirectoryEntry, RoutingError> {
        let owner_department = normalize_key(&owner.department);
        let mut candidates: Vec<DirectoryEntry> = self
            .directory
            .members_with_role(role)
            .into_iter()
            .filter(|entry| entry.user_id != owner.user_id)
            .collect();

        candidates.sort_by_key(|entry| {
            let assigned = already_assigned.iter().any(|approver| approver.user_id == entry.user_id);
            let other_department = normalize_key(&entry.department) != owner_department;
            (assigned, other_department, entry.user_id.clone())
        });

        candidates.into_iter().next().ok_or_else(|| RoutingError::NoEligibleApprover {
            role: role.clone(),
            department: owner.department.clone(),
        })
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
