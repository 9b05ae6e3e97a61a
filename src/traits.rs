use std::time::Duration;

use async_trait::async_trait;

use crate::frame::Frame;

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors surfaced by the external data warehouse
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Narrow query interface onto the tabular warehouse. Credentials, pooling,
/// and retries all live behind this boundary.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// List the table identifiers of a dataset.
    async fn list_tables(&self, dataset: &str) -> WarehouseResult<Vec<String>>;

    /// List the column names of one table, in catalog order.
    async fn list_columns(&self, dataset: &str, table: &str) -> WarehouseResult<Vec<String>>;

    /// Open a fetch handle onto one `(dataset, table)` pair.
    async fn open(&self, dataset: &str, table: &str) -> WarehouseResult<Box<dyn TableHandle>>;

    /// Run a raw query, bounded by `timeout`.
    async fn query(&self, sql: &str, timeout: Duration) -> WarehouseResult<Frame>;

    /// Execute a data-modifying statement.
    async fn execute_update(&self, statement: &str) -> WarehouseResult<()>;
}

/// An open handle for fetching columns out of one bound table.
#[async_trait]
pub trait TableHandle: Send + Sync {
    /// Fetch the named columns, capped at `row_cap` rows (0 means unbounded).
    async fn fetch(&self, columns: &[String], row_cap: usize) -> WarehouseResult<Frame>;
}

/// Quote an SQL identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
