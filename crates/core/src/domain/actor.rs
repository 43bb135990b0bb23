use std::fmt;

use serde::{Deserialize, Serialize};

/// Directory user id. Ids are matched case-insensitively everywhere, so the value is trimmed
/// and lowercased once here and compared with plain equality afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized role key (`supervisor`, `finance`, ...). Roles appear verbatim inside status
/// strings such as `pending_finance`, so they are always lower snake case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub const SUPERVISOR: &'static str = "supervisor";
    pub const FINANCE: &'static str = "finance";

    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw
            .as_ref()
            .trim()
            .chars()
            .map(|ch| if ch == '-' || ch.is_whitespace() { '_' } else { ch.to_ascii_lowercase() })
            .collect();
        Self(normalized)
    }

    pub fn supervisor() -> Self {
        Self(Self::SUPERVISOR.to_owned())
    }

    pub fn finance() -> Self {
        Self(Self::FINANCE.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the caller, injected by the transport layer for every workflow operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterContext {
    pub user_id: UserId,
    pub role: Role,
}

impl RequesterContext {
    pub fn new(user_id: impl AsRef<str>, role: impl AsRef<str>) -> Self {
        Self { user_id: UserId::new(user_id), role: Role::new(role) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub user_id: UserId,
    pub name: String,
    pub department: String,
}
