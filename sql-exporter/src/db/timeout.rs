//! Deadline wrapper for a [`Database`].

use std::time::Duration;

use async_trait::async_trait;

use super::{Database, DatabaseError, ResultSet};

/// Bounds every call on the inner database with a deadline.
///
/// A call that does not finish in time is dropped and reported as
/// [`DatabaseError::Timeout`].
#[derive(Debug, Clone)]
pub struct Timeout<D> {
    inner: D,
    duration: Duration,
}

impl<D> Timeout<D> {
    /// Wrap `inner` so each ping and query is limited to `duration`.
    pub fn new(inner: D, duration: Duration) -> Self {
        Self { inner, duration }
    }
}

#[async_trait]
impl<D: Database> Database for Timeout<D> {
    async fn ping(&self) -> Result<(), DatabaseError> {
        tokio::time::timeout(self.duration, self.inner.ping())
            .await
            .map_err(|_| DatabaseError::Timeout(self.duration))?
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        tokio::time::timeout(self.duration, self.inner.query(sql))
            .await
            .map_err(|_| DatabaseError::Timeout(self.duration))?
    }
}
