//! Administrative operations.
//!
//! Stateless request/response actions over the executor: database and role
//! lifecycle, group role membership, privilege grants and inspection, and
//! bulk data ingestion. Every operation
//! checks its preconditions before the first mutating statement so the
//! partial-failure blast radius stays small, and every interpolated
//! identifier is validated and quoted first.

mod database;
mod ingest;
mod membership;
mod privilege;
mod role;

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;
use common::utils::quote_ident;

use crate::executor::{SqlExecutor, SqlValue};

pub use ingest::JsonRow;
pub use privilege::{grant_statements, revoke_statements};

/// Databases that can never be dropped, regardless of `force`.
pub const PROTECTED_DATABASES: [&str; 3] = ["postgres", "template0", "template1"];

/// The bootstrap superuser role, which can never be dropped.
pub const BOOTSTRAP_SUPERUSER: &str = "postgres";

/// High-level administrative operations against one target.
pub struct AdminOps {
    executor: Arc<SqlExecutor>,
    config: AppConfig,
}

impl AdminOps {
    pub fn new(executor: Arc<SqlExecutor>, config: AppConfig) -> Self {
        Self { executor, config }
    }

    pub(crate) fn executor(&self) -> &SqlExecutor {
        &self.executor
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whether a database exists on the server.
    pub(crate) async fn database_exists(&self, name: &str) -> AppResult<bool> {
        let row = self
            .executor
            .fetch_optional(
                "SELECT 1 FROM pg_database WHERE datname = $1",
                &[SqlValue::Text(name.to_string())],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Whether a role exists on the server.
    pub(crate) async fn role_exists(&self, name: &str) -> AppResult<bool> {
        let row = self
            .executor
            .fetch_optional(
                "SELECT 1 FROM pg_roles WHERE rolname = $1",
                &[SqlValue::Text(name.to_string())],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Name of the database this session is connected to, quoted for
    /// interpolation into GRANT statements.
    pub(crate) async fn current_database_quoted(&self) -> AppResult<String> {
        let row = self
            .executor
            .fetch_optional("SELECT current_database() AS name", &[])
            .await?;
        let name: String = row
            .as_ref()
            .and_then(|r| sqlx::Row::try_get(r, "name").ok())
            .unwrap_or_else(|| "postgres".to_string());
        quote_ident(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_databases_are_protected() {
        assert!(PROTECTED_DATABASES.contains(&"postgres"));
        assert!(PROTECTED_DATABASES.contains(&"template0"));
        assert!(PROTECTED_DATABASES.contains(&"template1"));
        assert!(!PROTECTED_DATABASES.contains(&"appdb"));
    }
}
