mod decode;
pub mod error;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub use error::DbError;
pub use pool::{Manager, Pool, PoolOptions, PooledConnection};
pub use postgres::PostgresDatabase;

/// One result row as column-name → value pairs, in result-set order.
pub type RowMap = serde_json::Map<String, Value>;

/// Trait defining the interface for database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a statement and materialize its result set, one mapping per row.
    /// Statements without a result set yield an empty vec.
    async fn fetch(&self, statement: &str, params: &[Value]) -> Result<Vec<RowMap>, DbError>;

    /// Run a statement for its side effects only (INSERT/UPDATE/DDL).
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<(), DbError>;

    /// Table → [(column, type)] for everything in the public schema.
    async fn schema(&self) -> Result<HashMap<String, Vec<(String, String)>>, DbError>;

    /// Tear the pool down. Further calls fail with [`DbError::PoolClosed`].
    async fn close(&self);
}
