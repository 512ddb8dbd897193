//! Bulk data ingestion.

use common::errors::{AppError, AppResult};
use common::models::operation::{OperationPayload, OperationResult, OperationStatus};
use common::utils::quote_ident;

use crate::executor::SqlValue;

use super::AdminOps;

/// One row of tabular data keyed by column name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Builds the parameterized INSERT statement for a set of columns.
/// Columns are taken in the map's (sorted) key order.
pub(crate) fn insert_statement(table: &str, columns: &[String]) -> AppResult<String> {
    if columns.is_empty() {
        return Err(AppError::Validation("rows have no columns".into()));
    }
    let table = quote_ident(table)?;
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<AppResult<_>>()?;
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        quoted.join(", "),
        placeholders.join(", ")
    ))
}

impl AdminOps {
    /// Inserts rows in batches.
    ///
    /// Column names come from the first row; missing keys in later rows
    /// bind NULL. Row-level failures are isolated at batch granularity
    /// and reported in the payload counts, never raised; only
    /// connection-level failures propagate as errors.
    pub async fn insert_rows(
        &self,
        table: &str,
        rows: &[JsonRow],
        batch_size: Option<usize>,
    ) -> AppResult<OperationResult> {
        let Some(first) = rows.first() else {
            return Ok(OperationResult::no_op("no rows to insert"));
        };

        let columns: Vec<String> = first.keys().cloned().collect();
        let sql = insert_statement(table, &columns)?;

        let batches: Vec<Vec<SqlValue>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| {
                        row.get(col)
                            .map(SqlValue::from_json)
                            .unwrap_or(SqlValue::Null)
                    })
                    .collect()
            })
            .collect();

        let batch_size = batch_size.unwrap_or(self.config().executor.batch_size);
        let (successful, failed) = self
            .executor()
            .execute_many(&sql, &batches, batch_size)
            .await?;

        tracing::info!(table, successful, failed, "bulk insert finished");

        let status = if failed == 0 {
            OperationStatus::Applied
        } else {
            OperationStatus::PartiallyApplied
        };
        Ok(OperationResult {
            status,
            detail: format!("inserted {successful} rows into '{table}' ({failed} failed)"),
            payload: OperationPayload::RowCounts { successful, failed },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_uses_quoted_columns_and_placeholders() {
        let sql = insert_statement("events", &["id".into(), "name".into()]).unwrap();
        assert_eq!(sql, "INSERT INTO \"events\" (\"id\", \"name\") VALUES ($1, $2)");
    }

    #[test]
    fn table_and_column_names_are_validated() {
        assert!(insert_statement("events; --", &["id".into()]).is_err());
        assert!(insert_statement("events", &["bad col".into()]).is_err());
        assert!(insert_statement("events", &[]).is_err());
    }
}
