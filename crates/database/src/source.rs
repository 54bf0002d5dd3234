use crate::error::DbError;
use crate::query::SeriesQuery;
use crate::row::decode_row;
use async_trait::async_trait;
use core_types::Value;
use sqlx::mysql::MySqlPool;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, MySql};
use tracing::debug;

/// Anything that can answer raw SQL and series queries with decoded rows.
///
/// `MySqlPool` is the production implementation; the contract lets the
/// reshaping logic run unchanged against an in-memory source.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Runs `sql` verbatim inside a transaction and returns every row.
    async fn execute_raw(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError>;

    /// Returns the rows selected by `query`, each laid out as
    /// `query.selected_fields()`, ordered by the index field.
    async fn fetch_series_rows(&self, query: &SeriesQuery) -> Result<Vec<Vec<Value>>, DbError>;
}

/// Checks out a connection, opening one if the pool is empty.
///
/// A lazy pool first talks to the server here, so every failure at this
/// point (unreachable host, rejected login) is a `Connection` error.
async fn checkout(pool: &MySqlPool) -> Result<PoolConnection<MySql>, DbError> {
    pool.acquire().await.map_err(DbError::Connection)
}

#[async_trait]
impl RowSource for MySqlPool {
    async fn execute_raw(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError> {
        let mut conn = checkout(self).await?;
        let mut tx = conn.begin().await?;
        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        debug!(rows = rows.len(), "Raw statement executed");
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_series_rows(&self, query: &SeriesQuery) -> Result<Vec<Vec<Value>>, DbError> {
        let mut builder = query.to_builder();
        debug!(sql = builder.sql(), "Executing series query");

        let mut conn = checkout(self).await?;
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row).collect()
    }
}
