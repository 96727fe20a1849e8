//! [`Database`] backed by an `sqlx` connection pool.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Column, Connection, Executor, Pool, Row};
use tracing::debug;

use super::decode::{decode_mysql_row, decode_postgres_row, decode_sqlite_row};
use super::{Database, DatabaseError, ResultSet};

/// Maximum pooled connections. Scrapes are serialized, so one connection is
/// in use at a time; the spare covers a connection being replaced.
const MAX_CONNECTIONS: u32 = 2;

/// A pooled connection to PostgreSQL, MySQL/MariaDB, or SQLite.
///
/// Each backend keeps its native driver so every column type it can return
/// is decoded with that driver's own types. Connections are opened lazily,
/// so an unreachable server is reported by the first
/// [`ping`](Database::ping) rather than here.
#[derive(Debug, Clone)]
pub enum SqlDatabase {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl SqlDatabase {
    /// Create a pool for the given connection URL.
    ///
    /// The backend is chosen from the URL scheme: `postgres://`,
    /// `postgresql://`, `mysql://`, `mariadb://` or `sqlite:`.
    pub fn connect_lazy(url: &str) -> Result<Self, DatabaseError> {
        let scheme = url.split(':').next().unwrap_or_default();

        let db = match scheme {
            "postgres" | "postgresql" => Self::Postgres(
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_lazy(url)
                    .map_err(DatabaseError::Connect)?,
            ),
            "mysql" | "mariadb" => Self::MySql(
                MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_lazy(url)
                    .map_err(DatabaseError::Connect)?,
            ),
            "sqlite" => Self::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_lazy(url)
                    .map_err(DatabaseError::Connect)?,
            ),
            other => return Err(DatabaseError::UnsupportedDriver(other.to_string())),
        };

        Ok(db)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

async fn ping_pool<DB: sqlx::Database>(pool: &Pool<DB>) -> Result<(), DatabaseError> {
    let mut conn = pool.acquire().await.map_err(DatabaseError::Ping)?;
    conn.ping().await.map_err(DatabaseError::Ping)
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Fetch every row of `$sql` from `$pool` and decode it with `$decode`.
///
/// Written as a macro because the executor bounds differ per backend.
macro_rules! fetch_result_set {
    ($pool:expr, $sql:expr, $decode:path) => {{
        let rows = sqlx::query($sql)
            .fetch_all($pool)
            .await
            .map_err(DatabaseError::Query)?;

        // Without a row there is nothing to read column names from.
        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => {
                debug!(sql = $sql, "Empty result, describing statement for column names");
                let described = $pool.describe($sql).await.map_err(DatabaseError::Query)?;
                column_names(described.columns())
            }
        };

        let rows = rows.iter().map($decode).collect::<Result<Vec<_>, _>>()?;
        ResultSet::new(columns, rows)
    }};
}

#[async_trait]
impl Database for SqlDatabase {
    async fn ping(&self) -> Result<(), DatabaseError> {
        match self {
            Self::Postgres(pool) => ping_pool(pool).await,
            Self::MySql(pool) => ping_pool(pool).await,
            Self::Sqlite(pool) => ping_pool(pool).await,
        }
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        let result = match self {
            Self::Postgres(pool) => fetch_result_set!(pool, sql, decode_postgres_row),
            Self::MySql(pool) => fetch_result_set!(pool, sql, decode_mysql_row),
            Self::Sqlite(pool) => fetch_result_set!(pool, sql, decode_sqlite_row),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Cell;

    #[tokio::test]
    async fn test_connect_lazy_picks_backend_from_scheme() {
        assert!(matches!(
            SqlDatabase::connect_lazy("postgres://user@localhost/app"),
            Ok(SqlDatabase::Postgres(_))
        ));
        assert!(matches!(
            SqlDatabase::connect_lazy("postgresql://user@localhost/app"),
            Ok(SqlDatabase::Postgres(_))
        ));
        assert!(matches!(
            SqlDatabase::connect_lazy("mysql://root@localhost/app"),
            Ok(SqlDatabase::MySql(_))
        ));
        assert!(matches!(
            SqlDatabase::connect_lazy("sqlite::memory:"),
            Ok(SqlDatabase::Sqlite(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_unknown_scheme() {
        match SqlDatabase::connect_lazy("oracle://scott@db/orcl") {
            Err(DatabaseError::UnsupportedDriver(scheme)) => assert_eq!(scheme, "oracle"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sqlite_memory_query() {
        let db = SqlDatabase::connect_lazy("sqlite::memory:").unwrap();
        db.ping().await.unwrap();

        let result = db
            .query("SELECT 3 AS n, 1.5 AS f, 'us' AS region, NULL AS missing, x'6869' AS raw")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["n", "f", "region", "missing", "raw"]);
        assert_eq!(
            result.rows,
            vec![vec![
                Cell::Int(3),
                Cell::Float(1.5),
                Cell::Text("us".to_string()),
                Cell::Null,
                Cell::Bytes(b"hi".to_vec()),
            ]]
        );
        db.close().await;
    }
}
