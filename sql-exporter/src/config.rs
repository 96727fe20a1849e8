//! Configuration for the SQL exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::mapping::is_valid_metric_name;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Database driver used to interpret `data_source_name`.
    pub driver_name: Driver,

    /// Connection string handed to the driver.
    pub data_source_name: String,

    /// Deadline applied to every ping and query, in seconds (default: none).
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Queries to run on every scrape, in order.
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// A single query whose result rows become one metric family.
///
/// The first column of the result is the metric value. Every other column is
/// a label, named after the column. This is positional: column names and
/// types are never used to pick the value column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// SQL statement to execute.
    pub sql: String,

    /// Metric name, without the `sql_` namespace.
    pub name: String,

    /// Help text for the metric.
    #[serde(default)]
    pub help: String,
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl Driver {
    /// Driver name as written in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::Mysql => "mysql",
            Driver::Sqlite => "sqlite",
        }
    }

    /// URL schemes accepted for this driver.
    fn schemes(&self) -> &'static [&'static str] {
        match self {
            Driver::Postgres => &["postgres", "postgresql"],
            Driver::Mysql => &["mysql", "mariadb"],
            Driver::Sqlite => &["sqlite"],
        }
    }

    /// Prefix added to a DSN that has no scheme.
    fn url_prefix(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres://",
            Driver::Mysql => "mysql://",
            Driver::Sqlite => "sqlite:",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_source_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "data_source_name must not be empty".to_string(),
            ));
        }

        if self.query_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "query_timeout_secs must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, query) in self.queries.iter().enumerate() {
            if query.sql.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Query {} ({}) has an empty sql statement",
                    i, query.name
                )));
            }

            if !is_valid_metric_name(&query.name) {
                return Err(ConfigError::Validation(format!(
                    "Invalid metric name: {:?}",
                    query.name
                )));
            }

            if !seen.insert(query.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate metric name: {}",
                    query.name
                )));
            }
        }

        Ok(())
    }

    /// Per-call database deadline, if configured.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }

    /// Build the URL handed to the database driver.
    ///
    /// A DSN that already carries one of the driver's schemes is used as-is.
    /// Otherwise the driver's scheme is prepended, so `localhost/app` with the
    /// postgres driver becomes `postgres://localhost/app`.
    pub fn connection_url(&self) -> String {
        let dsn = self.data_source_name.trim();
        let has_scheme = self
            .driver_name
            .schemes()
            .iter()
            .any(|scheme| dsn.strip_prefix(scheme).is_some_and(|rest| rest.starts_with(':')));

        if has_scheme {
            dsn.to_string()
        } else {
            format!("{}{}", self.driver_name.url_prefix(), dsn)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
driver_name: sqlite
data_source_name: "sqlite::memory:"
"#;
        let config = ExporterConfig::parse(yaml).unwrap();

        assert_eq!(config.driver_name, Driver::Sqlite);
        assert!(config.queries.is_empty());
        assert_eq!(config.query_timeout(), None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
driver_name: postgresql
data_source_name: "postgres://user:pass@db:5432/app"
query_timeout_secs: 5
logging:
  level: debug
  format: json
queries:
  - sql: "SELECT count(*), region FROM stats GROUP BY region"
    name: stats_count
    help: "Rows by region"
  - sql: "SELECT 1"
    name: up
"#;

        let config = ExporterConfig::parse(yaml).unwrap();

        assert_eq!(config.driver_name, Driver::Postgres);
        assert_eq!(config.query_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[0].name, "stats_count");
        assert_eq!(config.queries[0].help, "Rows by region");
        assert_eq!(config.queries[1].name, "up");
        assert_eq!(config.queries[1].help, "");
    }

    #[test]
    fn test_query_order_preserved() {
        let yaml = r#"
driver_name: mysql
data_source_name: "mysql://localhost/app"
queries:
  - { sql: "SELECT 3", name: c }
  - { sql: "SELECT 1", name: a }
  - { sql: "SELECT 2", name: b }
"#;
        let config = ExporterConfig::parse(yaml).unwrap();
        let names: Vec<_> = config.queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_parse_malformed() {
        let result = ExporterConfig::parse("driver_name: [unterminated");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_parse_unknown_driver() {
        let yaml = r#"
driver_name: oracle
data_source_name: "oracle://db"
"#;
        assert!(matches!(
            ExporterConfig::parse(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/config.yml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/config.yml"));
    }

    #[test]
    fn test_validate_invalid_metric_name() {
        let yaml = r#"
driver_name: sqlite
data_source_name: "sqlite::memory:"
queries:
  - { sql: "SELECT 1", name: "bad-name" }
"#;
        let result = ExporterConfig::parse(yaml);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid metric name")
        );
    }

    #[test]
    fn test_validate_duplicate_names() {
        let yaml = r#"
driver_name: sqlite
data_source_name: "sqlite::memory:"
queries:
  - { sql: "SELECT 1", name: dup }
  - { sql: "SELECT 2", name: dup }
"#;
        let result = ExporterConfig::parse(yaml);
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_validate_empty_sql() {
        let yaml = r#"
driver_name: sqlite
data_source_name: "sqlite::memory:"
queries:
  - { sql: "  ", name: empty }
"#;
        assert!(matches!(
            ExporterConfig::parse(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let yaml = r#"
driver_name: sqlite
data_source_name: "sqlite::memory:"
query_timeout_secs: 0
"#;
        assert!(matches!(
            ExporterConfig::parse(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_empty_dsn() {
        let yaml = r#"
driver_name: postgres
data_source_name: ""
"#;
        assert!(matches!(
            ExporterConfig::parse(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_connection_url() {
        let mut config = ExporterConfig::parse(
            "driver_name: postgres\ndata_source_name: \"postgresql://db/app\"\n",
        )
        .unwrap();
        assert_eq!(config.connection_url(), "postgresql://db/app");

        config.data_source_name = "user@db:5432/app".to_string();
        assert_eq!(config.connection_url(), "postgres://user@db:5432/app");

        config.driver_name = Driver::Sqlite;
        config.data_source_name = "/var/lib/app.db".to_string();
        assert_eq!(config.connection_url(), "sqlite:/var/lib/app.db");

        config.data_source_name = "sqlite::memory:".to_string();
        assert_eq!(config.connection_url(), "sqlite::memory:");

        config.driver_name = Driver::Mysql;
        config.data_source_name = "root@localhost/app".to_string();
        assert_eq!(config.connection_url(), "mysql://root@localhost/app");
    }
}
