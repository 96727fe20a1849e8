//! The exporter: turns configured SQL queries into Prometheus metric families.
//!
//! # Query contract
//!
//! The first column of every query result is the metric value and must be
//! numeric. Every remaining column is a label, named after the column and
//! valued with the column's text form. The mapping is purely positional.
//!
//! # Scrape cycle
//!
//! Each call to [`Exporter::collect`] holds the exporter lock for the whole
//! cycle: ping, then every query in configuration order. The first error
//! aborts the rest of the cycle and increments the scrape-failure counter.
//! Families already processed in that cycle are still emitted. Observations
//! are never removed, so values from earlier cycles stay visible until a
//! later row overwrites them. A cycle whose future is dropped before it
//! finishes (the HTTP client went away) also counts as a failure.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use prometheus_client::collector::Collector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric};
use prometheus_client::metrics::counter::ConstCounter;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::config::QueryConfig;
use crate::db::{Cell, Database};
use crate::error::{ExporterError, ScrapeError};
use crate::mapping::{NAMESPACE, build_metric_name, decode_value, label_value, sanitize_label_name};

/// Name of the scrape failure counter, before the `_total` suffix.
pub const SCRAPE_FAILURES_NAME: &str = "exporter_scrape_failures";

const SCRAPE_FAILURES_HELP: &str = "Number of errors while scraping the database";

/// One (label values, value) point of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub label_values: Vec<String>,
    pub value: f64,
}

/// The observations of one metric family, as emitted by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub observations: Vec<Observation>,
}

impl FamilySnapshot {
    /// Value observed for the given label values, if any.
    pub fn get(&self, label_values: &[&str]) -> Option<f64> {
        self.observations
            .iter()
            .find(|o| o.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|o| o.value)
    }
}

/// Output of one scrape cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    /// Families refreshed by this cycle, in query order.
    pub families: Vec<FamilySnapshot>,
    /// Failure count, present only when this cycle failed.
    pub scrape_failures: Option<u64>,
}

impl Collected {
    /// Find an emitted family by its full metric name.
    pub fn family(&self, name: &str) -> Option<&FamilySnapshot> {
        self.families.iter().find(|f| f.name == name)
    }
}

impl Collector for Collected {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        for family in &self.families {
            // Gauge, not counter: the encoder suffixes counters with `_total`
            // and the configured name must appear unchanged.
            let mut metric_encoder = encoder.encode_descriptor(
                &family.name,
                &family.help,
                None,
                prometheus_client::metrics::MetricType::Gauge,
            )?;

            for observation in &family.observations {
                let labels: Vec<(String, String)> = family
                    .label_names
                    .iter()
                    .cloned()
                    .zip(observation.label_values.iter().cloned())
                    .collect();
                let sample_encoder = metric_encoder.encode_family(&labels)?;
                ConstGauge::new(observation.value).encode(sample_encoder)?;
            }
        }

        if let Some(failures) = self.scrape_failures {
            let counter = ConstCounter::new(failures);
            let name = build_metric_name(NAMESPACE, SCRAPE_FAILURES_NAME);
            let metric_encoder = encoder.encode_descriptor(
                &name,
                SCRAPE_FAILURES_HELP,
                None,
                counter.metric_type(),
            )?;
            counter.encode(metric_encoder)?;
        }

        Ok(())
    }
}

/// A metric family built from one query.
///
/// The label schema is fixed when the family is created; later results must
/// have the same columns.
#[derive(Debug, Clone)]
pub(crate) struct MetricFamily {
    name: String,
    help: String,
    columns: Vec<String>,
    label_names: Vec<String>,
    observations: BTreeMap<Vec<String>, f64>,
}

impl MetricFamily {
    /// Build a family from a query and the columns its result reported.
    fn new(query: &QueryConfig, columns: Vec<String>) -> Result<Self, ExporterError> {
        if columns.is_empty() {
            return Err(ExporterError::NoColumns {
                sql: query.sql.clone(),
            });
        }

        let label_names: Vec<String> = columns[1..]
            .iter()
            .map(|c| sanitize_label_name(c))
            .collect();

        let mut seen = HashSet::new();
        for label in &label_names {
            if !seen.insert(label) {
                return Err(ExporterError::DuplicateLabel {
                    sql: query.sql.clone(),
                    label: label.clone(),
                });
            }
        }

        Ok(Self {
            name: build_metric_name(NAMESPACE, &query.name),
            help: query.help.clone(),
            columns,
            label_names,
            observations: BTreeMap::new(),
        })
    }

    /// Set the value for a label tuple, replacing any earlier value.
    fn set(&mut self, label_values: Vec<String>, value: f64) {
        self.observations.insert(label_values, value);
    }

    fn check_columns(&self, sql: &str, actual: &[String]) -> Result<(), ScrapeError> {
        if self.columns != actual {
            return Err(ScrapeError::SchemaMismatch {
                sql: sql.to_string(),
                expected: self.columns.clone(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }

    fn snapshot(&self) -> FamilySnapshot {
        FamilySnapshot {
            name: self.name.clone(),
            help: self.help.clone(),
            label_names: self.label_names.clone(),
            observations: self
                .observations
                .iter()
                .map(|(label_values, value)| Observation {
                    label_values: label_values.clone(),
                    value: *value,
                })
                .collect(),
        }
    }
}

struct ExporterState {
    families: Vec<MetricFamily>,
    scrape_failures: u64,
}

/// The state lock held for one scrape cycle.
///
/// Dropped without [`finish`](Cycle::finish), the cycle was cancelled
/// part-way and is counted as failed.
struct Cycle<'a> {
    state: MutexGuard<'a, ExporterState>,
    finished: bool,
}

impl Cycle<'_> {
    fn finish(mut self, result: Result<(), ScrapeError>) -> Option<u64> {
        self.finished = true;
        let e = result.err()?;
        self.state.scrape_failures += 1;
        warn!(
            error = %e,
            scrape_failures = self.state.scrape_failures,
            "Scrape failed"
        );
        Some(self.state.scrape_failures)
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.scrape_failures += 1;
            warn!(
                scrape_failures = self.state.scrape_failures,
                "Scrape cancelled before it finished"
            );
        }
    }
}

/// Runs the configured queries on each scrape and exposes their results.
pub struct Exporter {
    queries: Vec<QueryConfig>,
    db: Arc<dyn Database>,
    state: Mutex<ExporterState>,
}

/// Create a shareable exporter handle.
pub type SharedExporter = Arc<Exporter>;

impl Exporter {
    /// Create an exporter, probing every query once to learn its columns.
    ///
    /// Fails if the database is unreachable, any query fails, or a query
    /// returns no columns.
    pub async fn new(
        queries: Vec<QueryConfig>,
        db: Arc<dyn Database>,
    ) -> Result<Self, ExporterError> {
        db.ping().await.map_err(ExporterError::Connectivity)?;

        let mut families = Vec::with_capacity(queries.len());
        for query in &queries {
            debug!(sql = %query.sql, "Probing query");

            let result = db
                .query(&query.sql)
                .await
                .map_err(|source| ExporterError::Query {
                    sql: query.sql.clone(),
                    source,
                })?;

            let family = MetricFamily::new(query, result.columns)?;
            debug!(
                metric = %family.name,
                labels = ?family.label_names,
                "Created metric family"
            );
            families.push(family);
        }

        info!(families = families.len(), "Exporter initialized");

        Ok(Self {
            queries,
            db,
            state: Mutex::new(ExporterState {
                families,
                scrape_failures: 0,
            }),
        })
    }

    /// Run one scrape cycle.
    ///
    /// Concurrent calls are serialized: a second call waits until the first
    /// has finished every query.
    pub async fn collect(&self) -> Collected {
        let mut cycle = Cycle {
            state: self.state.lock().await,
            finished: false,
        };
        let mut collected = Collected::default();

        let result = self.scrape(&mut cycle.state, &mut collected.families).await;
        collected.scrape_failures = cycle.finish(result);

        collected
    }

    /// Run one scrape cycle and encode it in the OpenMetrics text format.
    pub async fn render(&self) -> Result<String, std::fmt::Error> {
        let collected = self.collect().await;

        let mut registry = Registry::default();
        registry.register_collector(Box::new(collected));

        let mut output = String::new();
        prometheus_client::encoding::text::encode(&mut output, &registry)?;
        Ok(output)
    }

    /// Total failed scrape cycles since startup.
    pub async fn scrape_failures(&self) -> u64 {
        self.state.lock().await.scrape_failures
    }

    /// Current observations of every family, including values left over
    /// from earlier cycles.
    pub async fn snapshot(&self) -> Vec<FamilySnapshot> {
        let state = self.state.lock().await;
        state.families.iter().map(MetricFamily::snapshot).collect()
    }

    async fn scrape(
        &self,
        state: &mut ExporterState,
        out: &mut Vec<FamilySnapshot>,
    ) -> Result<(), ScrapeError> {
        self.db.ping().await.map_err(ScrapeError::Ping)?;

        for (query, family) in self.queries.iter().zip(state.families.iter_mut()) {
            debug!(sql = %query.sql, "Running query");

            let result = self
                .db
                .query(&query.sql)
                .await
                .map_err(|source| ScrapeError::Query {
                    sql: query.sql.clone(),
                    source,
                })?;

            family.check_columns(&query.sql, &result.columns)?;

            for (i, row) in result.rows.into_iter().enumerate() {
                let (label_values, value) = scan_row(&query.sql, i, family.columns.len(), &row)?;
                trace!(metric = %family.name, labels = ?label_values, value, "Row");
                family.set(label_values, value);
            }

            out.push(family.snapshot());
        }

        Ok(())
    }
}

/// Split a row into label values and the numeric value.
fn scan_row(
    sql: &str,
    row: usize,
    width: usize,
    cells: &[Cell],
) -> Result<(Vec<String>, f64), ScrapeError> {
    if cells.len() != width || width == 0 {
        return Err(ScrapeError::Scan {
            sql: sql.to_string(),
            row,
            reason: format!("row has {} cells, expected {}", cells.len(), width),
        });
    }

    let value = decode_value(&cells[0]).map_err(|reason| ScrapeError::Scan {
        sql: sql.to_string(),
        row,
        reason,
    })?;

    Ok((cells[1..].iter().map(label_value).collect(), value))
}
