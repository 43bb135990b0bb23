use crate::approvals::DirectoryEntry;
use crate::config::WorkflowConfig;
use crate::domain::actor::Role;
use crate::domain::entity::EntityKind;
use crate::domain::status::{ChainScope, StatusVocabulary};

/// Everything that distinguishes one entity kind's workflow from another. The engine itself is
/// kind-agnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub kind: EntityKind,
    pub review_roles: Vec<Role>,
    /// Empty when the kind has no post-disbursement justification.
    pub justification_roles: Vec<Role>,
    /// `Some` for kinds that pay out money after approval.
    pub disbursing_role: Option<Role>,
}

impl WorkflowDefinition {
    pub fn cash_request(review_roles: Vec<Role>, justification_roles: Vec<Role>) -> Self {
        Self {
            kind: EntityKind::CashRequest,
            review_roles,
            justification_roles,
            disbursing_role: Some(Role::finance()),
        }
    }

    pub fn supplier_application(review_roles: Vec<Role>) -> Self {
        Self {
            kind: EntityKind::SupplierApplication,
            review_roles,
            justification_roles: Vec::new(),
            disbursing_role: None,
        }
    }

    pub fn contract(review_roles: Vec<Role>) -> Self {
        Self {
            kind: EntityKind::Contract,
            review_roles,
            justification_roles: Vec::new(),
            disbursing_role: None,
        }
    }

    pub fn vocabulary(&self) -> StatusVocabulary {
        self.kind.vocabulary()
    }

    pub fn is_disbursable(&self) -> bool {
        self.disbursing_role.is_some()
    }

    pub fn supports_justification(&self) -> bool {
        self.is_disbursable() && !self.justification_roles.is_empty()
    }

    pub fn roles(&self, scope: ChainScope) -> &[Role] {
        match scope {
            ChainScope::Review => &self.review_roles,
            ChainScope::Justification => &self.justification_roles,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowCatalog {
    cash_request: WorkflowDefinition,
    supplier_application: WorkflowDefinition,
    contract: WorkflowDefinition,
}

impl WorkflowCatalog {
    pub fn new(
        cash_request: WorkflowDefinition,
        supplier_application: WorkflowDefinition,
        contract: WorkflowDefinition,
    ) -> Self {
        Self { cash_request, supplier_application, contract }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            WorkflowDefinition::cash_request(
                to_roles(&config.cash_request_roles),
                to_roles(&config.justification_roles),
            ),
            WorkflowDefinition::supplier_application(to_roles(&config.supplier_roles)),
            WorkflowDefinition::contract(to_roles(&config.contract_roles)),
        )
    }

    pub fn definition(&self, kind: EntityKind) -> &WorkflowDefinition {
        match kind {
            EntityKind::CashRequest => &self.cash_request,
            EntityKind::SupplierApplication => &self.supplier_application,
            EntityKind::Contract => &self.contract,
        }
    }

    /// Roles that must be held by some directory member for every chain to resolve, sorted and
    /// deduplicated. `supervisor` resolves through the owner's manager and is never listed.
    pub fn directory_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = [&self.cash_request, &self.supplier_application, &self.contract]
            .into_iter()
            .flat_map(|definition| {
                definition.review_roles.iter().chain(&definition.justification_roles)
            })
            .filter(|role| role.as_str() != Role::SUPERVISOR)
            .cloned()
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    pub fn uncovered_roles(&self, entries: &[DirectoryEntry]) -> Vec<Role> {
        self.directory_roles()
            .into_iter()
            .filter(|role| !entries.iter().any(|entry| &entry.role == role))
            .collect()
    }
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

fn to_roles(raw: &[String]) -> Vec<Role> {
    raw.iter().map(Role::new).collect()
}
