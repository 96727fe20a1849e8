//! Prometheus exporter for SQL query results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use sql_exporter::db::Timeout;
use sql_exporter::http::parse_listen_address;
use sql_exporter::logging::init_tracing;
use sql_exporter::{Database, Exporter, ExporterConfig, HttpServer, SqlDatabase};

/// Prometheus exporter for SQL query results.
#[derive(Parser, Debug)]
#[command(name = "sql-exporter")]
#[command(about = "Export SQL query results as Prometheus metrics")]
#[command(disable_version_flag = true)]
struct Args {
    /// The address to listen on for HTTP requests.
    #[arg(long, default_value = ":9012")]
    listen_address: String,

    /// Config file path (YAML).
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Show version number.
    #[arg(long)]
    version: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.version {
        let bin = std::env::args()
            .next()
            .unwrap_or_else(|| "sql-exporter".to_string());
        eprintln!("{} version {}", bin, env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = ExporterConfig::load_from_file(&args.config)?;
    init_tracing(&config.logging, args.log_level.as_deref())?;

    let listen_addr = parse_listen_address(&args.listen_address)?;

    info!(
        listen = %listen_addr,
        pid = std::process::id(),
        driver = %config.driver_name,
        queries = config.queries.len(),
        "Starting SQL exporter"
    );
    if config.queries.is_empty() {
        warn!("No queries configured, only the failure counter will be exported");
    }

    let pool = SqlDatabase::connect_lazy(&config.connection_url())?;
    let db: Arc<dyn Database> = match config.query_timeout() {
        Some(timeout) => Arc::new(Timeout::new(pool.clone(), timeout)),
        None => Arc::new(pool.clone()),
    };

    let exporter = Arc::new(Exporter::new(config.queries.clone(), db).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(exporter, listen_addr);
    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    tokio::select! {
        result = &mut http_task => {
            // The server only returns early on a bind or serve error.
            pool.close().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = sigterm() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    match tokio::time::timeout(Duration::from_secs(5), http_task).await {
        Ok(Ok(Err(e))) => error!("HTTP server error: {}", e),
        Err(_) => warn!("HTTP server did not stop in time"),
        _ => {}
    }

    pool.close().await;
    info!("Exporter stopped");
    Ok(())
}

async fn sigterm() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
