//! Query execution against the data warehouse

mod cache;
mod sql_api;
mod table;

pub use cache::{QueryCache, QueryOutcome};
pub use sql_api::{SqlApiWarehouse, StatementContext};
pub use table::{cell_text, Table};

use crate::gateway::GatewayError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{code}: {message}")]
    Statement { code: String, message: String },
    #[error("Statement did not finish within the request timeout")]
    Timeout,
    #[error("{0}")]
    Decode(String),
}

/// Something that can run SQL and hand back a table
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// `bindings` fill `?` placeholders positionally, as text
    async fn query(&self, sql: &str, bindings: &[String]) -> Result<Table, WarehouseError>;
}
