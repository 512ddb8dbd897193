//! SQL execution layer.
//!
//! Every statement the engine runs goes through [`SqlExecutor`]: scoped
//! acquire/release, explicit transactions for mutations, a small linear
//! retry for transient connection failures, and slow-statement logging.

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::Postgres;

use common::config::ExecutorSettings;
use common::errors::{AppError, AppResult};

use crate::pool::AdminPool;

/// A parameter value bound into a statement.
///
/// JSON rows from bulk ingestion map onto these; compound JSON values are
/// serialized to text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Maps a JSON value onto a bindable parameter.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            compound => SqlValue::Text(compound.to_string()),
        }
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// Running success/failure row counts for a chunked load.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ChunkTally {
    pub successful: usize,
    pub failed: usize,
}

impl ChunkTally {
    /// Folds one chunk outcome into the tally. A failed chunk is counted
    /// and the load continues; a transient connection failure aborts the
    /// whole load instead, since every later chunk would hit it too.
    pub fn record(&mut self, rows: usize, outcome: AppResult<()>) -> AppResult<()> {
        match outcome {
            Ok(()) => {
                self.successful += rows;
                Ok(())
            }
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    rows,
                    "batch failed, continuing with next batch"
                );
                self.failed += rows;
                Ok(())
            }
        }
    }
}

/// Executes parameterized statements against one pool.
pub struct SqlExecutor {
    pool: AdminPool,
    settings: ExecutorSettings,
}

impl SqlExecutor {
    pub fn new(pool: AdminPool, settings: ExecutorSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &AdminPool {
        &self.pool
    }

    /// Runs a read statement and returns all rows.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<PgRow>> {
        let started = Instant::now();
        let rows = self
            .with_retry(sql, move || async move {
                let query = bind_values(sqlx::query(sql), params);
                Ok(query.fetch_all(self.pool.inner()).await?)
            })
            .await?;
        self.log_if_slow(sql, started.elapsed());
        Ok(rows)
    }

    /// Runs a read statement expecting at most one row.
    pub async fn fetch_optional(&self, sql: &str, params: &[SqlValue]) -> AppResult<Option<PgRow>> {
        let started = Instant::now();
        let row = self
            .with_retry(sql, move || async move {
                let query = bind_values(sqlx::query(sql), params);
                Ok(query.fetch_optional(self.pool.inner()).await?)
            })
            .await?;
        self.log_if_slow(sql, started.elapsed());
        Ok(row)
    }

    /// Runs one mutating statement inside an explicit transaction.
    ///
    /// On any error the transaction is rolled back before the connection
    /// goes back to the pool; on success it commits exactly once.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        let started = Instant::now();
        let affected = self
            .with_retry(sql, move || async move {
                let mut tx = self.pool.inner().begin().await?;
                let query = bind_values(sqlx::query(sql), params);
                match query.execute(&mut *tx).await {
                    Ok(done) => {
                        tx.commit().await?;
                        Ok(done.rows_affected())
                    }
                    Err(err) => {
                        tx.rollback().await.ok();
                        Err(err.into())
                    }
                }
            })
            .await?;
        self.log_if_slow(sql, started.elapsed());
        Ok(affected)
    }

    /// Runs several mutating statements in one transaction, in order.
    /// All or nothing.
    pub async fn execute_batch(&self, statements: &[String]) -> AppResult<()> {
        let started = Instant::now();
        let mut tx = self.pool.inner().begin().await?;
        for sql in statements {
            if let Err(err) = sqlx::query(sql).execute(&mut *tx).await {
                tx.rollback().await.ok();
                return Err(err.into());
            }
        }
        tx.commit().await?;
        self.log_if_slow(
            statements.first().map(String::as_str).unwrap_or(""),
            started.elapsed(),
        );
        Ok(())
    }

    /// Runs non-idempotent DDL with autocommit and no retry. Covers
    /// statements PostgreSQL refuses inside a transaction block
    /// (CREATE/DROP DATABASE) and role creation: a retried CREATE after
    /// an ambiguous connection drop could observe its own partial
    /// success and report "already exists" for its own work.
    pub async fn execute_ddl(&self, sql: &str) -> AppResult<u64> {
        let started = Instant::now();
        let done = sqlx::query(sql)
            .execute(self.pool.inner())
            .await
            .map_err(AppError::from)?;
        self.log_if_slow(sql, started.elapsed());
        Ok(done.rows_affected())
    }

    /// Batched parameterized insert.
    ///
    /// Rows are chunked; each chunk runs in its own transaction. A failed
    /// chunk is rolled back, counted, and the load continues with the next
    /// chunk, so one bad row never aborts an entire large load. Returns
    /// `(successful, failed)` row counts at chunk granularity. Only
    /// connection-level failures propagate as errors.
    pub async fn execute_many(
        &self,
        sql: &str,
        rows: &[Vec<SqlValue>],
        batch_size: usize,
    ) -> AppResult<(usize, usize)> {
        let batch_size = batch_size.max(1);
        let mut tally = ChunkTally::default();

        for chunk in rows.chunks(batch_size) {
            let outcome = self.insert_chunk(sql, chunk).await;
            tally.record(chunk.len(), outcome)?;
        }

        Ok((tally.successful, tally.failed))
    }

    async fn insert_chunk(&self, sql: &str, chunk: &[Vec<SqlValue>]) -> AppResult<()> {
        let mut tx = self.pool.inner().begin().await?;
        for row in chunk {
            let query = bind_values(sqlx::query(sql), row);
            if let Err(err) = query.execute(&mut *tx).await {
                tx.rollback().await.ok();
                return Err(err.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Retries transient connection-level failures with linear backoff.
    /// Statement, validation and authentication errors surface on the
    /// first attempt.
    async fn with_retry<T, F, Fut>(&self, sql: &str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.settings.retry_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && tries < attempts => {
                    let backoff =
                        Duration::from_millis(self.settings.retry_backoff_ms * u64::from(tries));
                    tracing::warn!(
                        error = %err,
                        attempt = tries,
                        backoff_ms = backoff.as_millis() as u64,
                        statement = statement_prefix(sql),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn log_if_slow(&self, sql: &str, elapsed: Duration) {
        let threshold = Duration::from_millis(self.settings.slow_statement_ms);
        if elapsed > threshold {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                statement = statement_prefix(sql),
                "slow statement"
            );
        }
    }
}

/// First 80 characters of a statement, for log lines.
fn statement_prefix(sql: &str) -> String {
    let trimmed = sql.trim();
    if trimmed.len() <= 80 {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(i, _)| *i < 80)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(80);
        format!("{}...", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_scalars_map_to_bindable_values() {
        assert_eq!(
            SqlValue::from_json(&serde_json::json!("alice")),
            SqlValue::Text("alice".into())
        );
        assert_eq!(SqlValue::from_json(&serde_json::json!(42)), SqlValue::Int(42));
        assert_eq!(
            SqlValue::from_json(&serde_json::json!(1.5)),
            SqlValue::Float(1.5)
        );
        assert_eq!(
            SqlValue::from_json(&serde_json::json!(true)),
            SqlValue::Bool(true)
        );
        assert_eq!(SqlValue::from_json(&serde_json::Value::Null), SqlValue::Null);
    }

    #[test]
    fn compound_json_is_serialized_to_text() {
        let value = SqlValue::from_json(&serde_json::json!({"a": 1}));
        assert_eq!(value, SqlValue::Text("{\"a\":1}".into()));
    }

    #[test]
    fn one_bad_chunk_is_counted_and_the_load_continues() {
        let mut tally = ChunkTally::default();
        for _ in 0..3 {
            tally.record(100, Ok(())).unwrap();
        }
        tally
            .record(100, Err(AppError::Statement("null value in column".into())))
            .unwrap();
        tally.record(100, Ok(())).unwrap();
        assert_eq!(tally.successful, 400);
        assert_eq!(tally.failed, 100);
    }

    #[test]
    fn transient_failure_aborts_the_load() {
        let mut tally = ChunkTally::default();
        tally.record(100, Ok(())).unwrap();
        let err = tally
            .record(100, Err(AppError::ConnectionFailure("broken pipe".into())))
            .unwrap_err();
        assert!(err.is_transient());
        // Counts before the abort stand; the aborted chunk is neither
        // successful nor failed.
        assert_eq!(tally.successful, 100);
        assert_eq!(tally.failed, 0);
    }

    #[test]
    fn statement_prefix_truncates_long_sql() {
        let long = format!("SELECT {}", "x".repeat(200));
        let prefix = statement_prefix(&long);
        assert!(prefix.ends_with("..."));
        assert!(prefix.len() <= 84);
        assert_eq!(statement_prefix("SELECT 1"), "SELECT 1");
    }
}
