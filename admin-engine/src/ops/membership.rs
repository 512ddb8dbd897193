//! Group role membership and privilege inspection.
//!
//! Group roles collect privileges without logging in; membership grants
//! attach users to them. Inspection resolves effective access through the
//! server's `has_database_privilege` / `has_table_privilege` functions, so
//! privileges inherited through membership are included.

use sqlx::Row;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::metrics::{DatabaseAccess, GroupRoleOverview, TableAccess, UserPrivileges};
use common::models::operation::{CreateRoleRequest, OperationResult};
use common::utils::quote_ident;

use crate::executor::SqlValue;

use super::AdminOps;

/// `GRANT role TO member`, both names validated and quoted.
pub(crate) fn membership_grant(role: &str, member: &str) -> AppResult<String> {
    Ok(format!(
        "GRANT {} TO {}",
        quote_ident(role)?,
        quote_ident(member)?
    ))
}

/// `REVOKE role FROM member`, both names validated and quoted.
pub(crate) fn membership_revoke(role: &str, member: &str) -> AppResult<String> {
    Ok(format!(
        "REVOKE {} FROM {}",
        quote_ident(role)?,
        quote_ident(member)?
    ))
}

impl AdminOps {
    /// Creates a group role, optionally inheriting from a parent role.
    ///
    /// Idempotent: an existing role of the same name is a no-op warning.
    /// The parent must exist before anything is mutated. A membership
    /// grant failure after creation reports partial success.
    pub async fn create_role(&self, req: &CreateRoleRequest) -> AppResult<OperationResult> {
        req.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let quoted = quote_ident(&req.name)?;

        if self.role_exists(&req.name).await? {
            tracing::warn!(role = %req.name, "role already exists");
            return Ok(OperationResult::no_op(format!(
                "role '{}' already exists",
                req.name
            )));
        }

        if let Some(parent) = &req.parent {
            if !self.role_exists(parent).await? {
                return Err(AppError::RoleNotFound(parent.clone()));
            }
        }

        self.executor()
            .execute_ddl(&format!("CREATE ROLE {quoted} NOLOGIN"))
            .await?;
        tracing::info!(role = %req.name, parent = req.parent.as_deref(), "group role created");

        if let Some(parent) = &req.parent {
            let grant = membership_grant(parent, &req.name)?;
            if let Err(err) = self.executor().execute(&grant, &[]).await {
                tracing::warn!(role = %req.name, parent, error = %err, "parent membership failed");
                return Ok(OperationResult::partial(format!(
                    "role '{}' created but membership in '{parent}' failed: {err}",
                    req.name
                )));
            }
        }

        Ok(OperationResult::applied(format!(
            "role '{}' created",
            req.name
        )))
    }

    /// Grants a user membership in a group role. Both roles must exist.
    /// Re-granting an existing membership is harmless on the server side.
    pub async fn assign_role(&self, user: &str, role: &str) -> AppResult<OperationResult> {
        for name in [user, role] {
            if !self.role_exists(name).await? {
                return Err(AppError::RoleNotFound(name.to_string()));
            }
        }
        self.executor()
            .execute(&membership_grant(role, user)?, &[])
            .await?;
        tracing::info!(user, role, "role membership granted");
        Ok(OperationResult::applied(format!(
            "role '{role}' assigned to '{user}'"
        )))
    }

    /// Revokes a user's membership in a group role. Both roles must exist;
    /// revoking a membership that was never granted is harmless.
    pub async fn revoke_role(&self, user: &str, role: &str) -> AppResult<OperationResult> {
        for name in [user, role] {
            if !self.role_exists(name).await? {
                return Err(AppError::RoleNotFound(name.to_string()));
            }
        }
        self.executor()
            .execute(&membership_revoke(role, user)?, &[])
            .await?;
        tracing::info!(user, role, "role membership revoked");
        Ok(OperationResult::applied(format!(
            "role '{role}' revoked from '{user}'"
        )))
    }

    /// Lists non-system roles with their flags and members. Transient
    /// catalog state; never cached.
    pub async fn list_roles(&self) -> AppResult<Vec<GroupRoleOverview>> {
        let rows = self
            .executor()
            .fetch_all(
                "SELECT r.rolname AS name, \
                        r.rolsuper AS is_superuser, \
                        r.rolcreatedb AS can_create_db, \
                        r.rolcreaterole AS can_create_role, \
                        r.rolinherit AS inherits, \
                        r.rolcanlogin AS can_login, \
                        coalesce(array_agg(m.rolname::text) \
                            FILTER (WHERE m.rolname IS NOT NULL), '{}') AS members \
                 FROM pg_roles r \
                 LEFT JOIN pg_auth_members am ON am.roleid = r.oid \
                 LEFT JOIN pg_roles m ON m.oid = am.member \
                 WHERE r.rolname NOT LIKE 'pg\\_%' \
                 GROUP BY r.oid, r.rolname, r.rolsuper, r.rolcreatedb, \
                          r.rolcreaterole, r.rolinherit, r.rolcanlogin \
                 ORDER BY r.rolname",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| GroupRoleOverview {
                name: row.try_get("name").unwrap_or_default(),
                is_superuser: row.try_get("is_superuser").unwrap_or(false),
                can_create_db: row.try_get("can_create_db").unwrap_or(false),
                can_create_role: row.try_get("can_create_role").unwrap_or(false),
                inherits: row.try_get("inherits").unwrap_or(false),
                can_login: row.try_get("can_login").unwrap_or(false),
                members: row.try_get("members").unwrap_or_default(),
            })
            .collect())
    }

    /// Resolves a role's effective privileges across databases and the
    /// first 100 user tables. Membership-inherited grants are included
    /// because the server functions resolve through group roles.
    pub async fn get_user_privileges(&self, user: &str) -> AppResult<UserPrivileges> {
        if !self.role_exists(user).await? {
            return Err(AppError::RoleNotFound(user.to_string()));
        }
        let param = &[SqlValue::Text(user.to_string())];

        let database_rows = self
            .executor()
            .fetch_all(
                "SELECT datname AS database, \
                        has_database_privilege($1, datname, 'CONNECT') AS can_connect, \
                        has_database_privilege($1, datname, 'CREATE') AS can_create, \
                        has_database_privilege($1, datname, 'TEMPORARY') AS can_temp \
                 FROM pg_database \
                 WHERE datistemplate = false \
                 ORDER BY datname",
                param,
            )
            .await?;

        let table_rows = self
            .executor()
            .fetch_all(
                "SELECT schemaname AS schema_name, \
                        tablename AS table_name, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'SELECT') AS can_select, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'INSERT') AS can_insert, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'UPDATE') AS can_update, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'DELETE') AS can_delete, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'TRUNCATE') AS can_truncate, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'REFERENCES') AS can_references, \
                        has_table_privilege($1, format('%I.%I', schemaname, tablename), 'TRIGGER') AS can_trigger \
                 FROM pg_tables \
                 WHERE schemaname NOT IN ('information_schema', 'pg_catalog') \
                 ORDER BY schemaname, tablename \
                 LIMIT 100",
                param,
            )
            .await?;

        Ok(UserPrivileges {
            role: user.to_string(),
            databases: database_rows
                .iter()
                .map(|row| DatabaseAccess {
                    database: row.try_get("database").unwrap_or_default(),
                    can_connect: row.try_get("can_connect").unwrap_or(false),
                    can_create: row.try_get("can_create").unwrap_or(false),
                    can_temp: row.try_get("can_temp").unwrap_or(false),
                })
                .collect(),
            tables: table_rows
                .iter()
                .map(|row| TableAccess {
                    schema: row.try_get("schema_name").unwrap_or_default(),
                    table: row.try_get("table_name").unwrap_or_default(),
                    can_select: row.try_get("can_select").unwrap_or(false),
                    can_insert: row.try_get("can_insert").unwrap_or(false),
                    can_update: row.try_get("can_update").unwrap_or(false),
                    can_delete: row.try_get("can_delete").unwrap_or(false),
                    can_truncate: row.try_get("can_truncate").unwrap_or(false),
                    can_references: row.try_get("can_references").unwrap_or(false),
                    can_trigger: row.try_get("can_trigger").unwrap_or(false),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_statements_quote_both_names() {
        assert_eq!(
            membership_grant("readers", "bob").unwrap(),
            "GRANT \"readers\" TO \"bob\""
        );
        assert_eq!(
            membership_revoke("readers", "bob").unwrap(),
            "REVOKE \"readers\" FROM \"bob\""
        );
    }

    #[test]
    fn malicious_member_names_are_rejected() {
        assert!(membership_grant("readers", "bob; DROP ROLE admin").is_err());
        assert!(membership_grant("read ers", "bob").is_err());
        assert!(membership_revoke("readers", "bob\"").is_err());
    }
}
