//! Administrative operation request and result models.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How far an administrative operation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The server state was mutated as requested.
    Applied,
    /// Nothing needed doing (e.g. the database already existed). The server
    /// state is unchanged; callers treat this as a warning, not an error.
    NoOp,
    /// The primary mutation succeeded but a follow-up step failed. The
    /// detail names the step so the caller knows what is missing.
    PartiallyApplied,
}

/// Domain payload carried by an operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationPayload {
    /// Plaintext of a freshly generated password. This is the only place
    /// the plaintext is ever exposed.
    GeneratedPassword { password: String },
    /// Bulk ingestion outcome at batch granularity.
    RowCounts { successful: usize, failed: usize },
    None,
}

/// Result of every administrative operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    /// Human-readable outcome description.
    pub detail: String,
    pub payload: OperationPayload,
}

impl OperationResult {
    pub fn applied(detail: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Applied,
            detail: detail.into(),
            payload: OperationPayload::None,
        }
    }

    pub fn no_op(detail: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::NoOp,
            detail: detail.into(),
            payload: OperationPayload::None,
        }
    }

    pub fn partial(detail: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::PartiallyApplied,
            detail: detail.into(),
            payload: OperationPayload::None,
        }
    }

    pub fn with_payload(mut self, payload: OperationPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Whether the operation left the server in the requested state.
    pub fn is_complete(&self) -> bool {
        !matches!(self.status, OperationStatus::PartiallyApplied)
    }
}

/// Privilege template applied when creating a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleProfile {
    /// SELECT on existing tables plus a default-privilege rule for future
    /// tables.
    ReadOnly,
    /// SELECT/INSERT/UPDATE/DELETE on existing tables plus the matching
    /// default-privilege rule.
    ReadWrite,
}

impl RoleProfile {
    /// The fixed privilege list for this profile.
    pub fn privileges(&self) -> &'static [Privilege] {
        match self {
            RoleProfile::ReadOnly => &[Privilege::Select],
            RoleProfile::ReadWrite => &[
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete,
            ],
        }
    }
}

/// Grantable privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    References,
    Trigger,
    Usage,
    All,
}

impl Privilege {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Truncate => "TRUNCATE",
            Privilege::References => "REFERENCES",
            Privilege::Trigger => "TRIGGER",
            Privilege::Usage => "USAGE",
            Privilege::All => "ALL",
        }
    }
}

/// Object class a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Tables,
    Sequences,
}

impl ObjectKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ObjectKind::Tables => "TABLES",
            ObjectKind::Sequences => "SEQUENCES",
        }
    }
}

/// Request body for creating a database.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDatabaseRequest {
    /// Database name.
    #[validate(length(min = 1, max = 63, message = "Name must be 1-63 characters"))]
    pub name: String,
    /// Owner role (must already exist).
    pub owner: Option<String>,
    /// Database encoding (UTF8 if not specified).
    pub encoding: Option<String>,
}

/// Request body for creating a group role.
///
/// Group roles hold privileges without logging in; users are attached via
/// membership grants.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    /// Role name.
    #[validate(length(min = 1, max = 63, message = "Name must be 1-63 characters"))]
    pub name: String,
    /// Existing role granted to the new one, so it starts with that
    /// role's privileges.
    pub parent: Option<String>,
}

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    /// Role name.
    #[validate(length(min = 1, max = 63, message = "Name must be 1-63 characters"))]
    pub name: String,
    /// Password; generated per policy when absent.
    pub password: Option<String>,
    /// Privilege template to apply after creation.
    pub profile: RoleProfile,
    #[serde(default)]
    pub createdb: bool,
    #[serde(default)]
    pub createrole: bool,
    /// Whether the role can log in (default true).
    #[serde(default = "default_login")]
    pub login: bool,
    /// Per-role connection limit; unlimited when absent.
    pub connection_limit: Option<i32>,
}

fn default_login() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_profiles_are_fixed_mappings() {
        assert_eq!(RoleProfile::ReadOnly.privileges(), &[Privilege::Select]);
        assert_eq!(
            RoleProfile::ReadWrite.privileges(),
            &[
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete
            ]
        );
    }

    #[test]
    fn no_op_is_distinguishable_from_partial_failure() {
        assert!(OperationResult::no_op("already exists").is_complete());
        assert!(!OperationResult::partial("owner grant failed").is_complete());
    }
}
