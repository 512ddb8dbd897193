//! Privilege grants and revocations.
//!
//! Grants apply twice on purpose: once to already-existing objects and
//! once as a default-privilege rule for objects created later. Granting
//! only the former leaves newly created tables inaccessible, which is the
//! usual operational surprise this module exists to prevent.

use common::errors::{AppError, AppResult};
use common::models::operation::{ObjectKind, OperationResult, Privilege};
use common::utils::quote_ident;

use super::AdminOps;

fn privilege_list(privileges: &[Privilege]) -> String {
    if privileges.is_empty() {
        "ALL".to_string()
    } else {
        privileges
            .iter()
            .map(|p| p.as_sql())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builds the statement sequence for a grant.
pub fn grant_statements(
    user: &str,
    database: Option<&str>,
    schema: &str,
    privileges: &[Privilege],
    kind: ObjectKind,
) -> AppResult<Vec<String>> {
    let user = quote_ident(user)?;
    let schema = quote_ident(schema)?;
    let list = privilege_list(privileges);
    let kind = kind.as_sql();

    let mut statements = vec![
        format!("GRANT {list} ON ALL {kind} IN SCHEMA {schema} TO {user}"),
        format!("ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT {list} ON {kind} TO {user}"),
    ];
    if let Some(database) = database {
        let database = quote_ident(database)?;
        statements.push(format!("GRANT CONNECT ON DATABASE {database} TO {user}"));
    }
    Ok(statements)
}

/// Builds the statement sequence for a revoke, mirroring
/// [`grant_statements`]: both existing objects and the default-privilege
/// rule are revoked.
pub fn revoke_statements(
    user: &str,
    database: Option<&str>,
    schema: &str,
    privileges: &[Privilege],
    kind: ObjectKind,
) -> AppResult<Vec<String>> {
    let user = quote_ident(user)?;
    let schema = quote_ident(schema)?;
    let list = privilege_list(privileges);
    let kind = kind.as_sql();

    let mut statements = vec![
        format!("REVOKE {list} ON ALL {kind} IN SCHEMA {schema} FROM {user}"),
        format!("ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} REVOKE {list} ON {kind} FROM {user}"),
    ];
    if let Some(database) = database {
        let database = quote_ident(database)?;
        statements.push(format!("REVOKE CONNECT ON DATABASE {database} FROM {user}"));
    }
    Ok(statements)
}

impl AdminOps {
    /// Grants privileges to a role, on existing objects and as a
    /// default-privilege rule for future ones. All statements run in one
    /// transaction.
    pub async fn grant_privileges(
        &self,
        user: &str,
        database: Option<&str>,
        schema: &str,
        privileges: &[Privilege],
        kind: ObjectKind,
    ) -> AppResult<OperationResult> {
        if !self.role_exists(user).await? {
            return Err(AppError::RoleNotFound(user.to_string()));
        }
        let statements = grant_statements(user, database, schema, privileges, kind)?;
        self.executor().execute_batch(&statements).await?;
        tracing::info!(user, schema, ?kind, "privileges granted");
        Ok(OperationResult::applied(format!(
            "granted {} on {} in schema '{schema}' to '{user}'",
            privilege_list(privileges),
            kind.as_sql().to_lowercase()
        )))
    }

    /// Revokes privileges from a role, including its default-privilege
    /// rule. All statements run in one transaction.
    pub async fn revoke_privileges(
        &self,
        user: &str,
        database: Option<&str>,
        schema: &str,
        privileges: &[Privilege],
        kind: ObjectKind,
    ) -> AppResult<OperationResult> {
        if !self.role_exists(user).await? {
            return Err(AppError::RoleNotFound(user.to_string()));
        }
        let statements = revoke_statements(user, database, schema, privileges, kind)?;
        self.executor().execute_batch(&statements).await?;
        tracing::info!(user, schema, ?kind, "privileges revoked");
        Ok(OperationResult::applied(format!(
            "revoked {} on {} in schema '{schema}' from '{user}'",
            privilege_list(privileges),
            kind.as_sql().to_lowercase()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_covers_existing_and_future_objects() {
        let statements = grant_statements(
            "bob",
            Some("appdb"),
            "public",
            &[Privilege::Select],
            ObjectKind::Tables,
        )
        .unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "GRANT SELECT ON ALL TABLES IN SCHEMA \"public\" TO \"bob\""
        );
        assert_eq!(
            statements[1],
            "ALTER DEFAULT PRIVILEGES IN SCHEMA \"public\" GRANT SELECT ON TABLES TO \"bob\""
        );
        assert_eq!(
            statements[2],
            "GRANT CONNECT ON DATABASE \"appdb\" TO \"bob\""
        );
    }

    #[test]
    fn empty_privilege_list_means_all() {
        let statements =
            grant_statements("bob", None, "public", &[], ObjectKind::Sequences).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("GRANT ALL ON ALL SEQUENCES"));
    }

    #[test]
    fn revoke_mirrors_grant() {
        let statements = revoke_statements(
            "bob",
            Some("appdb"),
            "public",
            &[Privilege::Select, Privilege::Insert],
            ObjectKind::Tables,
        )
        .unwrap();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("REVOKE SELECT, INSERT ON ALL TABLES"));
        assert!(statements[1].contains("ALTER DEFAULT PRIVILEGES"));
        assert!(statements[1].contains("REVOKE SELECT, INSERT ON TABLES FROM \"bob\""));
    }

    #[test]
    fn malicious_names_never_reach_a_statement() {
        assert!(grant_statements(
            "bob; DROP TABLE users",
            None,
            "public",
            &[],
            ObjectKind::Tables
        )
        .is_err());
        assert!(grant_statements("bob", Some("app db"), "public", &[], ObjectKind::Tables).is_err());
    }
}
