//! Warehouse adapter trait for running freshness queries

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sourcefresh_core::AdapterResponse;
use std::fmt;

/// Which parts of a relation name get quoted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotePolicy {
    pub database: bool,
    pub schema: bool,
    pub identifier: bool,
}

impl Default for QuotePolicy {
    fn default() -> Self {
        Self {
            database: true,
            schema: true,
            identifier: true,
        }
    }
}

/// Identifies a table in a warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Database/catalog name; omitted from the rendered name when absent
    pub database: Option<String>,

    /// Schema/dataset name
    pub schema: String,

    /// Physical table name
    pub identifier: String,

    pub quoting: QuotePolicy,
}

impl Relation {
    pub fn new(database: Option<String>, schema: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            database,
            schema: schema.into(),
            identifier: identifier.into(),
            quoting: QuotePolicy::default(),
        }
    }

    pub fn with_quoting(mut self, quoting: QuotePolicy) -> Self {
        self.quoting = quoting;
        self
    }

    /// Get fully qualified name, unquoted
    pub fn fqn(&self) -> String {
        match &self.database {
            Some(database) => format!("{}.{}.{}", database, self.schema, self.identifier),
            None => format!("{}.{}", self.schema, self.identifier),
        }
    }

    /// Render the relation for use in SQL, quoting parts per the policy
    pub fn render(&self, adapter: &dyn WarehouseAdapter) -> String {
        let part = |value: &str, quote: bool| {
            if quote {
                adapter.quote(value)
            } else {
                value.to_string()
            }
        };

        let mut parts = Vec::with_capacity(3);
        if let Some(database) = &self.database {
            parts.push(part(database, self.quoting.database));
        }
        parts.push(part(&self.schema, self.quoting.schema));
        parts.push(part(&self.identifier, self.quoting.identifier));
        parts.join(".")
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// A single value in a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Interpret the value as a UTC timestamp.
    ///
    /// Text is accepted in RFC 3339 form or as a naive `YYYY-MM-DD HH:MM:SS[.f]`
    /// value, which is taken to be UTC.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Text(text) => parse_timestamp(text),
            _ => None,
        }
    }
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Rows returned by a query plus the adapter's response metadata
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub response: AdapterResponse,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    /// Value at row `row`, column `column`
    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Response map in the shape most adapters report for a select
    pub fn select_response(rows_affected: usize) -> AdapterResponse {
        let mut response = AdapterResponse::new();
        response.insert("_message".to_string(), format!("SELECT {}", rows_affected).into());
        response.insert("code".to_string(), "SELECT".into());
        response.insert("rows_affected".to_string(), rows_affected.into());
        response
    }
}

/// Errors that can occur when running a query
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Query timed out after {0}s")]
    Timeout(u64),
}

/// Trait for warehouse adapters that can run freshness queries
#[async_trait::async_trait]
pub trait WarehouseAdapter: Send + Sync {
    /// Get the adapter name (e.g., "PostgreSQL", "Mock")
    fn name(&self) -> &'static str;

    /// Quote an identifier for this warehouse's dialect
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// SQL expression for the warehouse's current time
    fn current_timestamp(&self) -> &'static str {
        "current_timestamp"
    }

    /// Upper bound on concurrent queries, when the adapter has one
    fn max_connections(&self) -> Option<usize> {
        None
    }

    /// Execute a query and return all rows
    async fn execute(&self, sql: &str) -> Result<QueryResult, QueryError>;

    /// Test the connection to the warehouse
    ///
    /// This is useful for validating credentials before any probes run.
    async fn test_connection(&self) -> Result<(), QueryError>;
}
