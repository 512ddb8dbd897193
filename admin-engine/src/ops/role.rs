//! Role lifecycle operations.

use sqlx::Row;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::metrics::RoleOverview;
use common::models::operation::{
    CreateUserRequest, OperationPayload, OperationResult, RoleProfile,
};
use common::utils::{password, quote_ident, quote_literal};

use super::{AdminOps, BOOTSTRAP_SUPERUSER};

/// Assembles the CREATE USER statement. Roles are always NOSUPERUSER;
/// escalation past CREATEDB/CREATEROLE is an operator action, not an API.
fn create_user_statement(quoted: &str, req: &CreateUserRequest, secret: &str) -> String {
    let mut options = vec!["NOSUPERUSER".to_string()];
    if req.createdb {
        options.push("CREATEDB".to_string());
    }
    if req.createrole {
        options.push("CREATEROLE".to_string());
    }
    options.push(if req.login { "LOGIN" } else { "NOLOGIN" }.to_string());
    if let Some(limit) = req.connection_limit {
        options.push(format!("CONNECTION LIMIT {limit}"));
    }
    options.push(format!("PASSWORD {}", quote_literal(secret)));
    format!("CREATE USER {quoted} WITH {}", options.join(" "))
}

impl AdminOps {
    /// Creates a login role and applies its privilege template.
    ///
    /// When no password is supplied, one is generated from the OS CSPRNG
    /// per the configured complexity policy and returned in the result
    /// payload; that payload is the only place the plaintext is ever
    /// exposed. A caller-supplied password is validated against the same
    /// policy and rejected rather than silently weakened.
    pub async fn create_user(&self, req: &CreateUserRequest) -> AppResult<OperationResult> {
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

        let policy = &self.config().password;
        let (secret, generated) = match &req.password {
            Some(supplied) => {
                password::validate(policy, supplied)?;
                (supplied.clone(), false)
            }
            None => (password::generate(policy), true),
        };

        // No retry here: a retried CREATE USER after an ambiguous
        // connection drop would report its own success as a conflict.
        self.executor()
            .execute_ddl(&create_user_statement(&quoted, req, &secret))
            .await?;
        tracing::info!(role = %req.name, profile = ?req.profile, "role created");

        let result = match self.apply_profile(&quoted, req.profile).await {
            Ok(()) => OperationResult::applied(format!(
                "role '{}' created with {:?} profile",
                req.name, req.profile
            )),
            Err(err) => {
                tracing::warn!(role = %req.name, error = %err, "privilege template failed");
                OperationResult::partial(format!(
                    "role '{}' created but privilege template failed: {err}",
                    req.name
                ))
            }
        };

        if generated {
            Ok(result.with_payload(OperationPayload::GeneratedPassword { password: secret }))
        } else {
            Ok(result)
        }
    }

    /// Applies the fixed privilege template for a profile: grants on
    /// existing tables in `public` plus the matching default-privilege
    /// rule for tables created later.
    async fn apply_profile(&self, quoted_user: &str, profile: RoleProfile) -> AppResult<()> {
        let database = self.current_database_quoted().await?;
        let privileges = profile
            .privileges()
            .iter()
            .map(|p| p.as_sql())
            .collect::<Vec<_>>()
            .join(", ");

        let connect = match profile {
            RoleProfile::ReadOnly => format!("GRANT CONNECT ON DATABASE {database} TO {quoted_user}"),
            RoleProfile::ReadWrite => {
                format!("GRANT CONNECT, CREATE ON DATABASE {database} TO {quoted_user}")
            }
        };

        self.executor()
            .execute_batch(&[
                connect,
                format!("GRANT {privileges} ON ALL TABLES IN SCHEMA public TO {quoted_user}"),
                format!(
                    "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT {privileges} ON TABLES TO {quoted_user}"
                ),
            ])
            .await
    }

    /// Drops a role.
    ///
    /// Refuses for the bootstrap superuser. With `reassign_to`, owned
    /// objects are reassigned (and remaining grants dropped) first so the
    /// drop never fails on dependent ownership.
    pub async fn drop_user(
        &self,
        name: &str,
        reassign_to: Option<&str>,
    ) -> AppResult<OperationResult> {
        let quoted = quote_ident(name)?;

        if name == BOOTSTRAP_SUPERUSER {
            return Err(AppError::PreconditionFailed(format!(
                "'{BOOTSTRAP_SUPERUSER}' is the bootstrap superuser and cannot be dropped"
            )));
        }

        if !self.role_exists(name).await? {
            return Ok(OperationResult::no_op(format!("role '{name}' does not exist")));
        }

        if let Some(heir) = reassign_to {
            if !self.role_exists(heir).await? {
                return Err(AppError::RoleNotFound(heir.to_string()));
            }
            let heir_quoted = quote_ident(heir)?;
            self.executor()
                .execute_batch(&[
                    format!("REASSIGN OWNED BY {quoted} TO {heir_quoted}"),
                    format!("DROP OWNED BY {quoted}"),
                ])
                .await?;
            tracing::info!(role = name, heir, "owned objects reassigned");
        }

        self.executor()
            .execute_ddl(&format!("DROP USER IF EXISTS {quoted}"))
            .await?;
        tracing::info!(role = name, "role dropped");

        Ok(OperationResult::applied(format!("role '{name}' dropped")))
    }

    /// Lists non-system roles with their flags and live connection
    /// counts. Transient catalog state; never cached.
    pub async fn list_users(&self) -> AppResult<Vec<RoleOverview>> {
        let rows = self
            .executor()
            .fetch_all(
                "SELECT rolname AS name, \
                        rolsuper AS is_superuser, \
                        rolcreatedb AS can_create_db, \
                        rolcreaterole AS can_create_role, \
                        rolcanlogin AS can_login, \
                        (SELECT count(*) FROM pg_stat_activity a WHERE a.usename = r.rolname) AS active_connections \
                 FROM pg_roles r \
                 WHERE rolname NOT LIKE 'pg\\_%' \
                 ORDER BY rolname",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| RoleOverview {
                name: row.try_get("name").unwrap_or_default(),
                is_superuser: row.try_get("is_superuser").unwrap_or(false),
                can_create_db: row.try_get("can_create_db").unwrap_or(false),
                can_create_role: row.try_get("can_create_role").unwrap_or(false),
                can_login: row.try_get("can_login").unwrap_or(false),
                active_connections: row.try_get("active_connections").unwrap_or(0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            name: "bob".into(),
            password: None,
            profile: RoleProfile::ReadOnly,
            createdb: false,
            createrole: false,
            login: true,
            connection_limit: None,
        }
    }

    #[test]
    fn created_roles_are_never_superusers() {
        let sql = create_user_statement("\"bob\"", &request(), "s3cret");
        assert_eq!(
            sql,
            "CREATE USER \"bob\" WITH NOSUPERUSER LOGIN PASSWORD 's3cret'"
        );
    }

    #[test]
    fn flags_and_limits_are_rendered_in_order() {
        let req = CreateUserRequest {
            createdb: true,
            createrole: true,
            login: false,
            connection_limit: Some(25),
            ..request()
        };
        let sql = create_user_statement("\"bob\"", &req, "s3cret");
        assert_eq!(
            sql,
            "CREATE USER \"bob\" WITH NOSUPERUSER CREATEDB CREATEROLE NOLOGIN \
             CONNECTION LIMIT 25 PASSWORD 's3cret'"
        );
    }

    #[test]
    fn password_literal_is_escaped() {
        let sql = create_user_statement("\"bob\"", &request(), "pa'ss");
        assert!(sql.ends_with("PASSWORD 'pa''ss'"));
    }
}
