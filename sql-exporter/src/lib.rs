//! Prometheus exporter for SQL databases.
//!
//! This crate runs a configured list of SQL queries on every scrape and
//! exposes each result row as a labeled metric via an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Database     │<────│    Exporter     │<────│   HTTP Server   │
//! │  (sqlx pool)    │     │ (scrape cycle)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! sql-exporter --config config.yml --listen-address :9012
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options, and
//! [`exporter`] for how query results become metrics.

pub mod config;
pub mod db;
pub mod error;
pub mod exporter;
pub mod http;
pub mod logging;
pub mod mapping;

pub use config::ExporterConfig;
pub use db::{Database, SqlDatabase};
pub use error::{ExporterError, ScrapeError};
pub use exporter::{Collected, Exporter, SharedExporter};
pub use http::HttpServer;
