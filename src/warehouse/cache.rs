//! Process-wide memoization of query results

use super::{Table, Warehouse, WarehouseError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of running one generated statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Table),
    Failed(String),
}

impl QueryOutcome {
    pub fn table(&self) -> Option<&Table> {
        match self {
            QueryOutcome::Rows(table) => Some(table),
            QueryOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryOutcome::Rows(_) => None,
            QueryOutcome::Failed(e) => Some(e),
        }
    }
}

/// Keyed by exact SQL text. Statement errors are cached as well: a statement
/// the warehouse rejected is not re-run for the lifetime of the process.
/// Transport failures and timeouts are returned without being stored.
pub struct QueryCache {
    warehouse: Arc<dyn Warehouse>,
    entries: RwLock<HashMap<String, Arc<QueryOutcome>>>,
}

impl QueryCache {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn execute(&self, sql: &str) -> Arc<QueryOutcome> {
        if let Some(hit) = self.entries.read().await.get(sql) {
            tracing::debug!(sql_len = sql.len(), "Query cache hit");
            return hit.clone();
        }

        // Two sessions may both miss and both run the statement; the first
        // stored value wins and neither is observable as different.
        tracing::debug!(sql_len = sql.len(), "Query cache miss");
        let outcome = match self.warehouse.query(sql, &[]).await {
            Ok(table) => QueryOutcome::Rows(table),
            Err(e @ WarehouseError::Statement { .. }) => {
                tracing::warn!(error = %e, "Generated SQL failed");
                QueryOutcome::Failed(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generated SQL could not be run; not caching");
                return Arc::new(QueryOutcome::Failed(e.to_string()));
            }
        };

        self.entries
            .write()
            .await
            .entry(sql.to_string())
            .or_insert_with(|| Arc::new(outcome))
            .clone()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
