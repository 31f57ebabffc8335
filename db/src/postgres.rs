use std::collections::HashMap;
use std::fmt;

use config::DatabaseConfig;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, Postgres};

use super::{Database, RowMap};
use crate::decode::row_to_map;
use crate::error::DbError;
use crate::pool::{Manager, Pool, PoolOptions, PooledConnection};

/// Opens one [`PgConnection`] per pool slot.
#[derive(Debug)]
pub struct PgManager {
    url: String,
}

impl PgManager {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl Manager for PgManager {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<PgConnection, DbError> {
        PgConnection::connect(&self.url)
            .await
            .map_err(|e| DbError::Connect {
                source: Box::new(e),
            })
    }

    async fn disconnect(&self, conn: PgConnection) {
        if let Err(error) = conn.close().await {
            tracing::warn!(%error, "connection did not close cleanly");
        }
    }
}

/// Pooled Postgres client.
///
/// Every statement runs on a pooled connection inside its own transaction:
/// committed on success, rolled back on failure, with the connection
/// returned to the pool either way.
pub struct PostgresDatabase {
    pool: Pool<PgManager>,
}

impl fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDatabase")
            .field("pool", &self.pool)
            .finish()
    }
}

impl PostgresDatabase {
    /// Connect a pooled client, eagerly opening `minconn` connections.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let options = PoolOptions {
            min_connections: config.minconn,
            max_connections: config.maxconn,
            ..PoolOptions::default()
        };
        Self::connect_with(config, options).await
    }

    /// Like [`connect`](Self::connect), with full control over the pool,
    /// including the checkout timeout.
    pub async fn connect_with(
        config: &DatabaseConfig,
        options: PoolOptions,
    ) -> Result<Self, DbError> {
        let pool = Pool::connect(PgManager::new(config.url()), options).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<PgManager> {
        &self.pool
    }

    async fn run(
        conn: &mut PooledConnection<'_, PgManager>,
        statement: &str,
        params: &[Value],
        collect: bool,
    ) -> Result<Vec<RowMap>, DbError> {
        // The transaction reborrows the connection, so the broken flag is
        // set only after the transaction's borrow has ended.
        match Self::run_in_transaction(&mut *conn, statement, params, collect).await {
            Ok(rows) => Ok(rows),
            Err((source, broken)) => {
                if broken {
                    conn.mark_broken();
                }
                Err(DbError::Query { source })
            }
        }
    }

    async fn run_in_transaction(
        conn: &mut PgConnection,
        statement: &str,
        params: &[Value],
        collect: bool,
    ) -> Result<Vec<RowMap>, (sqlx::Error, bool)> {
        // Transaction scope is exactly this one statement.
        let mut tx = match conn.begin().await {
            Ok(tx) => tx,
            Err(source) => {
                let broken = is_connection_fatal(&source);
                return Err((source, broken));
            }
        };

        tracing::debug!(statement, "executing statement");

        let outcome = if collect {
            bind_parameters(statement, params).fetch_all(&mut *tx).await
        } else {
            bind_parameters(statement, params)
                .execute(&mut *tx)
                .await
                .map(|_| Vec::new())
        };

        match outcome {
            Ok(rows) => {
                if let Err(source) = tx.commit().await {
                    let broken = is_connection_fatal(&source);
                    return Err((source, broken));
                }
                Ok(rows.iter().map(row_to_map).collect())
            }
            Err(source) => {
                tracing::error!(statement, %source, "statement failed, rolling back");
                let mut broken = is_connection_fatal(&source);
                if let Err(error) = tx.rollback().await {
                    tracing::warn!(%error, "rollback failed, discarding connection");
                    broken = true;
                }
                Err((source, broken))
            }
        }
    }
}

/// Whether the error means the connection itself is gone (or in an unknown
/// state), as opposed to the statement merely being rejected. A dead
/// connection must not be checked back into the pool.
fn is_connection_fatal(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_)
    )
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    async fn fetch(&self, statement: &str, params: &[Value]) -> Result<Vec<RowMap>, DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::run(&mut conn, statement, params, true).await
    }

    async fn execute(&self, statement: &str, params: &[Value]) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::run(&mut conn, statement, params, false).await?;
        Ok(())
    }

    async fn schema(&self) -> Result<HashMap<String, Vec<(String, String)>>, DbError> {
        let rows = self
            .fetch(
                r"SELECT c.table_name, c.column_name, c.udt_name AS column_type
                  FROM information_schema.columns c
                  WHERE c.table_schema = 'public'
                  ORDER BY c.table_name, c.ordinal_position",
                &[],
            )
            .await?;

        let mut schema: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in rows {
            let (Some(table), Some(column), Some(column_type)) = (
                row.get("table_name").and_then(Value::as_str),
                row.get("column_name").and_then(Value::as_str),
                row.get("column_type").and_then(Value::as_str),
            ) else {
                continue;
            };
            schema
                .entry(table.to_string())
                .or_default()
                .push((column.to_string(), column_type.to_string()));
        }
        Ok(schema)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Attach positional parameters to a statement. Parameters travel
/// out-of-band to the server; nothing is ever interpolated into the SQL
/// text.
fn bind_parameters<'q>(
    statement: &'q str,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(statement), |query, param| match param {
            Value::Null => query.bind(None::<&str>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(n) => match n.as_i64() {
                Some(int) => query.bind(int),
                None => query.bind(n.as_f64()),
            },
            Value::String(text) => query.bind(text.as_str()),
            json @ (Value::Array(_) | Value::Object(_)) => query.bind(json.clone()),
        })
}
