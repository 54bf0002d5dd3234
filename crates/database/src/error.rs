use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    Configuration(String),

    #[error("Failed to connect to the database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Query execution failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Could not reshape the query result: {0}")]
    Reshape(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(_) => DbError::Configuration(err.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => DbError::Connection(err),
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. } => DbError::Reshape(err.to_string()),
            _ => DbError::Query(err),
        }
    }
}

impl From<polars::prelude::PolarsError> for DbError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        DbError::Reshape(err.to_string())
    }
}
