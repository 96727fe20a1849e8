//! Database access used by the exporter.
//!
//! The exporter only needs two operations from a database: a liveness ping
//! and running a statement to completion. [`Database`] captures exactly that,
//! so the scrape logic can run against [`SqlDatabase`] in production and a
//! scripted mock in tests.

mod decode;
mod pool;
mod timeout;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use pool::SqlDatabase;
pub use timeout::Timeout;

/// Errors reported by a [`Database`].
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Ping failed: {0}")]
    Ping(#[source] sqlx::Error),

    /// The statement was rejected or failed while running. Callers add the
    /// SQL text, so the message is the driver's own.
    #[error("{0}")]
    Query(#[source] sqlx::Error),

    #[error("Cannot decode column {column} ({name}): unsupported type {type_name}")]
    Decode {
        column: usize,
        name: String,
        type_name: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The connection URL names a backend that is not compiled in.
    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),
}

/// A single decoded value from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A fully fetched query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names, in select-list order.
    pub columns: Vec<String>,
    /// Rows, each with one cell per column.
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    /// Create a result set from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }
}

/// The operations the exporter performs against a database.
#[async_trait]
pub trait Database: Send + Sync {
    /// Check that the database is reachable.
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Run a statement and fetch every row.
    ///
    /// Column names must be reported even when the result has no rows.
    async fn query(&self, sql: &str) -> Result<ResultSet, DatabaseError>;
}
