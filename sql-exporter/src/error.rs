//! Error types for the exporter.

use thiserror::Error;

use crate::db::DatabaseError;

/// Errors that prevent the exporter from starting.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The initial ping failed.
    #[error("Database is unreachable: {0}")]
    Connectivity(#[source] DatabaseError),

    /// A query failed while probing its column layout.
    #[error("Query failed: {sql}: {source}")]
    Query {
        sql: String,
        #[source]
        source: DatabaseError,
    },

    /// A query returned no columns, so it has no value column.
    #[error("Query returned no columns: {sql}")]
    NoColumns { sql: String },

    /// Two columns map to the same label name.
    #[error("Query {sql} has duplicate label {label}")]
    DuplicateLabel { sql: String, label: String },
}

/// Errors that abort a single scrape cycle.
///
/// These are never fatal. They are logged and counted, and the next scrape
/// starts again from scratch.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Ping failed: {0}")]
    Ping(#[source] DatabaseError),

    #[error("Query failed: {sql}: {source}")]
    Query {
        sql: String,
        #[source]
        source: DatabaseError,
    },

    /// A row's value column could not be read as a number.
    #[error("Cannot scan row {row} of {sql}: {reason}")]
    Scan {
        sql: String,
        row: usize,
        reason: String,
    },

    /// The query's columns differ from those seen at startup.
    #[error("Columns of {sql} changed: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        sql: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_error() -> DatabaseError {
        DatabaseError::Query(sqlx::Error::Protocol("relation \"stats\" does not exist".into()))
    }

    #[test]
    fn test_query_error_message_names_sql_once() {
        let startup = ExporterError::Query {
            sql: "SELECT count FROM stats".to_string(),
            source: driver_error(),
        }
        .to_string();
        let scrape = ScrapeError::Query {
            sql: "SELECT count FROM stats".to_string(),
            source: driver_error(),
        }
        .to_string();

        for message in [startup, scrape] {
            assert_eq!(message.matches("Query failed").count(), 1, "{}", message);
            assert!(message.starts_with("Query failed: SELECT count FROM stats: "), "{}", message);
            assert!(message.contains("does not exist"), "{}", message);
        }
    }

    #[test]
    fn test_timeout_message() {
        let err = ScrapeError::Query {
            sql: "SELECT 1".to_string(),
            source: DatabaseError::Timeout(std::time::Duration::from_secs(5)),
        };
        assert_eq!(err.to_string(), "Query failed: SELECT 1: Timed out after 5s");
    }
}
