//! Database lifecycle operations.

use sqlx::Row;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::metrics::DatabaseOverview;
use common::models::operation::{CreateDatabaseRequest, OperationResult};
use common::utils::{quote_ident, quote_literal};

use crate::executor::SqlValue;

use super::{AdminOps, PROTECTED_DATABASES};

impl AdminOps {
    /// Creates a database, optionally owned by an existing role.
    ///
    /// Idempotent: an existing database of the same name is a no-op
    /// warning, not an error. When an owner is given, the owner role must
    /// exist before anything is mutated. ALTER OWNER / GRANT ALL run as a
    /// best-effort follow-up; if they fail after CREATE DATABASE
    /// succeeded, the result reports partial success.
    pub async fn create_database(&self, req: &CreateDatabaseRequest) -> AppResult<OperationResult> {
        req.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let quoted = quote_ident(&req.name)?;

        if self.database_exists(&req.name).await? {
            tracing::warn!(database = %req.name, "database already exists");
            return Ok(OperationResult::no_op(format!(
                "database '{}' already exists",
                req.name
            )));
        }

        let owner_quoted = match &req.owner {
            Some(owner) => {
                if !self.role_exists(owner).await? {
                    return Err(AppError::RoleNotFound(owner.clone()));
                }
                Some(quote_ident(owner)?)
            }
            None => None,
        };

        let encoding = req.encoding.as_deref().unwrap_or("UTF8");
        self.executor()
            .execute_ddl(&format!(
                "CREATE DATABASE {quoted} ENCODING {}",
                quote_literal(encoding)
            ))
            .await?;
        tracing::info!(database = %req.name, "database created");

        if let Some(owner_quoted) = owner_quoted {
            let owner = req.owner.as_deref().unwrap_or_default();
            let follow_up = async {
                self.executor()
                    .execute_ddl(&format!("ALTER DATABASE {quoted} OWNER TO {owner_quoted}"))
                    .await?;
                self.executor()
                    .execute_ddl(&format!(
                        "GRANT ALL PRIVILEGES ON DATABASE {quoted} TO {owner_quoted}"
                    ))
                    .await?;
                Ok::<_, AppError>(())
            };
            if let Err(err) = follow_up.await {
                tracing::warn!(database = %req.name, owner, error = %err, "ownership follow-up failed");
                return Ok(OperationResult::partial(format!(
                    "database '{}' created but ownership transfer to '{owner}' failed: {err}",
                    req.name
                )));
            }
        }

        Ok(OperationResult::applied(format!(
            "database '{}' created",
            req.name
        )))
    }

    /// Drops a database.
    ///
    /// Refuses unconditionally for the protected system databases. With
    /// `force`, other backend sessions on the database are terminated
    /// first; termination failures are logged but not fatal, since the
    /// DROP itself will fail if sessions persist.
    pub async fn drop_database(&self, name: &str, force: bool) -> AppResult<OperationResult> {
        let quoted = quote_ident(name)?;

        if PROTECTED_DATABASES.contains(&name) {
            return Err(AppError::PreconditionFailed(format!(
                "'{name}' is a protected system database"
            )));
        }

        if !self.database_exists(name).await? {
            return Ok(OperationResult::no_op(format!(
                "database '{name}' does not exist"
            )));
        }

        if force {
            match self.terminate_backends(name).await {
                Ok(terminated) => {
                    tracing::info!(database = name, terminated, "terminated backend sessions")
                }
                Err(err) => {
                    tracing::warn!(database = name, error = %err, "session termination failed")
                }
            }
        }

        self.executor()
            .execute_ddl(&format!("DROP DATABASE IF EXISTS {quoted}"))
            .await?;
        tracing::info!(database = name, "database dropped");

        Ok(OperationResult::applied(format!("database '{name}' dropped")))
    }

    /// Terminates every other backend session on a database and returns
    /// how many were signalled.
    ///
    /// Used by forced drops, and by the external archive collaborator to
    /// claim a brief exclusive window immediately before a restore.
    pub async fn terminate_backends(&self, database: &str) -> AppResult<u64> {
        let rows = self
            .executor()
            .fetch_all(
                "SELECT pg_terminate_backend(pid) \
                 FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
                &[SqlValue::Text(database.to_string())],
            )
            .await?;
        Ok(rows.len() as u64)
    }

    /// Lists non-template databases with owner, size and live session
    /// counts. Transient catalog state; never cached.
    pub async fn list_databases(&self) -> AppResult<Vec<DatabaseOverview>> {
        let rows = self
            .executor()
            .fetch_all(
                "SELECT d.datname AS name, \
                        pg_get_userbyid(d.datdba) AS owner, \
                        pg_database_size(d.datname) AS size_bytes, \
                        (SELECT count(*) FROM pg_stat_activity a WHERE a.datname = d.datname) AS connections, \
                        pg_encoding_to_char(d.encoding) AS encoding \
                 FROM pg_database d \
                 WHERE d.datistemplate = false \
                 ORDER BY size_bytes DESC",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| DatabaseOverview {
                name: row.try_get("name").unwrap_or_default(),
                owner: row.try_get("owner").ok(),
                size_bytes: row.try_get("size_bytes").unwrap_or(0),
                connections: row.try_get("connections").unwrap_or(0),
                encoding: row.try_get("encoding").ok(),
            })
            .collect())
    }
}
