//! PostgreSQL warehouse adapter
//!
//! Runs freshness queries over a single `tokio-postgres` client. It works with:
//! - PostgreSQL 9.4+
//! - Amazon Redshift
//! - Other PostgreSQL-compatible databases
//!
//! ## Authentication
//!
//! The adapter supports:
//! 1. Direct password authentication
//! 2. Connection string (PostgreSQL key/value format)
//! 3. TLS/SSL connections via native-tls
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Using direct credentials
//! let adapter = PostgresAdapter::connect("localhost", 5432, "mydb", "username", "password").await?;
//!
//! // Using connection string with SSL
//! let adapter = PostgresAdapter::from_connection_string_with_tls(
//!     "host=localhost port=5432 dbname=mydb user=username password=password sslmode=require"
//! ).await?;
//! ```

use crate::adapter::{QueryError, WarehouseAdapter, QueryResult};

#[cfg(feature = "postgres")]
use crate::adapter::CellValue;

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, NoTls, Config as PgConfig, Row as PgRow};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

#[cfg(not(feature = "postgres"))]
const NOT_COMPILED: &str =
    "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres";

/// PostgreSQL warehouse adapter
///
/// Connects to PostgreSQL and executes freshness queries. It supports both
/// plain and TLS connections.
pub struct PostgresAdapter {
    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Client,

    /// Connection host
    host: String,

    /// Database name
    database: String,

    /// Concurrent query limit from `max_connections`
    max_connections: Option<usize>,
}

impl PostgresAdapter {
    /// Create a new PostgreSQL adapter with direct credentials
    ///
    /// For TLS connections, use `connect_with_tls` instead.
    #[cfg(feature = "postgres")]
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let host = host.into();
        let database = database.into();
        let config = format!(
            "host={} port={} dbname={} user={} password={}",
            host,
            port,
            database,
            user.into(),
            password.into()
        );

        let (client, connection) = tokio_postgres::connect(&config, NoTls)
            .await
            .map_err(|e| QueryError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{}: {}",
                host, port, e
            )))?;

        Self::spawn_connection(connection, &host, port);

        Ok(Self {
            client,
            host,
            database,
            max_connections: None,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create a PostgreSQL adapter with TLS support
    #[cfg(feature = "postgres")]
    pub async fn connect_with_tls(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let host = host.into();
        let database = database.into();
        let config = format!(
            "host={} port={} dbname={} user={} password={}",
            host,
            port,
            database,
            user.into(),
            password.into()
        );

        let (client, connection) = tokio_postgres::connect(&config, Self::tls_connector()?)
            .await
            .map_err(|e| QueryError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{} with TLS: {}",
                host, port, e
            )))?;

        Self::spawn_connection(connection, &host, port);

        Ok(Self {
            client,
            host,
            database,
            max_connections: None,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect_with_tls(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create adapter from a PostgreSQL connection string
    ///
    /// Supports standard PostgreSQL connection string format:
    /// `host=localhost port=5432 dbname=mydb user=postgres password=secret`
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str) -> Result<Self, QueryError> {
        let (host, port, database) = Self::describe(conn_str)?;

        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(|e| QueryError::AuthenticationError(format!("Failed to connect: {}", e)))?;

        Self::spawn_connection(connection, &host, port);

        Ok(Self {
            client,
            host,
            database,
            max_connections: None,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str) -> Result<Self, QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create adapter from a PostgreSQL connection string with TLS
    ///
    /// The `sslmode` setting is ignored, TLS is always used.
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string_with_tls(conn_str: &str) -> Result<Self, QueryError> {
        let (host, port, database) = Self::describe(conn_str)?;

        let (client, connection) = tokio_postgres::connect(conn_str, Self::tls_connector()?)
            .await
            .map_err(|e| QueryError::AuthenticationError(format!(
                "Failed to connect with TLS: {}", e
            )))?;

        Self::spawn_connection(connection, &host, port);

        Ok(Self {
            client,
            host,
            database,
            max_connections: None,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string_with_tls(_conn_str: &str) -> Result<Self, QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Host, port and database of a connection string, for logging
    #[cfg(feature = "postgres")]
    fn describe(conn_str: &str) -> Result<(String, u16, String), QueryError> {
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| QueryError::ConfigError(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.get_ports().first().copied().unwrap_or(5432);
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        Ok((host, port, database))
    }

    #[cfg(feature = "postgres")]
    fn tls_connector() -> Result<MakeTlsConnector, QueryError> {
        let connector = TlsConnector::builder()
            .build()
            .map_err(|e| QueryError::ConfigError(format!("Failed to create TLS connector: {}", e)))?;
        Ok(MakeTlsConnector::new(connector))
    }

    /// Drive the connection in the background
    #[cfg(feature = "postgres")]
    fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>, host: &str, port: u16)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let host = host.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(%host, port, error = %e, "PostgreSQL connection error");
            }
        });
    }

    /// Decode one column of a result row.
    ///
    /// Freshness queries only return timestamps, so other types are decoded
    /// on a best-effort basis and fall back to null.
    #[cfg(feature = "postgres")]
    fn decode_cell(row: &PgRow, idx: usize) -> CellValue {
        use chrono::{DateTime, NaiveDateTime, Utc};

        if let Ok(value) = row.try_get::<_, Option<DateTime<Utc>>>(idx) {
            return value.map_or(CellValue::Null, CellValue::Timestamp);
        }
        if let Ok(value) = row.try_get::<_, Option<NaiveDateTime>>(idx) {
            return value.map_or(CellValue::Null, |naive| CellValue::Timestamp(naive.and_utc()));
        }
        if let Ok(value) = row.try_get::<_, Option<i64>>(idx) {
            return value.map_or(CellValue::Null, CellValue::Int);
        }
        if let Ok(value) = row.try_get::<_, Option<i32>>(idx) {
            return value.map_or(CellValue::Null, |v| CellValue::Int(v.into()));
        }
        if let Ok(value) = row.try_get::<_, Option<f64>>(idx) {
            return value.map_or(CellValue::Null, CellValue::Float);
        }
        if let Ok(value) = row.try_get::<_, Option<String>>(idx) {
            return value.map_or(CellValue::Null, CellValue::Text);
        }
        CellValue::Null
    }

    /// Map a driver error message onto the adapter error kinds
    pub fn classify_error(message: String) -> QueryError {
        if message.contains("does not exist") {
            QueryError::RelationNotFound(message)
        } else if message.contains("permission denied") {
            QueryError::PermissionDenied(message)
        } else {
            QueryError::QueryError(message)
        }
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Cap the scheduler at `max_connections` concurrent queries
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    #[cfg(feature = "postgres")]
    async fn execute(&self, sql: &str) -> Result<QueryResult, QueryError> {
        // Display alone only says "db error"; the server message is in the source
        let rows = self.client.query(sql, &[]).await.map_err(|e| {
            let message = match e.as_db_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            };
            Self::classify_error(message)
        })?;

        let decoded: Vec<Vec<CellValue>> = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| Self::decode_cell(row, idx)).collect())
            .collect();

        Ok(QueryResult {
            response: QueryResult::select_response(decoded.len()),
            rows: decoded,
        })
    }

    #[cfg(not(feature = "postgres"))]
    async fn execute(&self, _sql: &str) -> Result<QueryResult, QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), QueryError> {
        // Simple query to test connection
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| QueryError::NetworkError(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), QueryError> {
        Err(QueryError::ConfigError(NOT_COMPILED.to_string()))
    }
}
