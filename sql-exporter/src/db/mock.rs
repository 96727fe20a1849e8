//! Scripted in-memory database for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Cell, Database, DatabaseError, ResultSet};

enum Scripted {
    Rows(ResultSet),
    Fail(String),
}

/// A database whose answers are set up by the test.
///
/// Every call is recorded, optionally delayed, and checked for overlap with
/// other calls so tests can assert that scrapes never interleave.
#[derive(Default)]
pub(crate) struct MockDatabase {
    scripts: Mutex<HashMap<String, Scripted>>,
    ping_fails: AtomicBool,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockDatabase {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer `sql` with the given columns and rows.
    pub(crate) fn set_result(&self, sql: &str, columns: &[&str], rows: Vec<Vec<Cell>>) {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(sql.to_string(), Scripted::Rows(ResultSet::new(columns, rows)));
    }

    /// Make `sql` fail.
    pub(crate) fn fail_query(&self, sql: &str) {
        self.scripts.lock().unwrap().insert(
            sql.to_string(),
            Scripted::Fail(format!("query rejected: {}", sql)),
        );
    }

    pub(crate) fn set_ping_failure(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    /// Highest number of calls that were running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every call made so far: `"ping"` or the SQL text.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.enter("ping").await;
        self.exit();
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(DatabaseError::Ping(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        self.enter(sql).await;
        self.exit();
        let message = match self.scripts.lock().unwrap().get(sql) {
            Some(Scripted::Rows(result)) => return Ok(result.clone()),
            Some(Scripted::Fail(message)) => message.clone(),
            None => format!("no script for {}", sql),
        };
        Err(DatabaseError::Query(sqlx::Error::Protocol(message)))
    }
}
