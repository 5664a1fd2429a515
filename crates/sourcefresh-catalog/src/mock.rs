//! Mock warehouse adapter for testing
//!
//! This adapter keeps tables in memory and answers freshness queries
//! without connecting to any warehouse. It's useful for:
//! - Unit testing probe classification and scheduling
//! - Running the CLI against a JSON fixture instead of a database
//! - Simulating query failures, slow queries and connection limits
//!
//! Only the query shape the prober emits is understood:
//!
//! ```sql
//! select max(<column>) as max_loaded_at, <expr> as snapshotted_at
//! from <relation> [where <col> <op> <literal> [and ...]]
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = MockAdapter::new();
//! adapter.add_table("analytics.orders", vec![row]).await;
//! let result = adapter.execute(sql).await?;
//!
//! // Simulate network latency
//! let adapter = MockAdapter::new().with_latency(100); // 100ms delay
//! ```

use crate::adapter::{parse_timestamp, CellValue, QueryError, QueryResult, WarehouseAdapter};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A table row keyed by column name
pub type Row = HashMap<String, CellValue>;

/// Mock warehouse adapter for testing
///
/// Tables are keyed by their unquoted relation name (`schema.table` or
/// `database.schema.table`). Clones share the same tables.
///
/// # Example
///
/// ```rust,ignore
/// let adapter = MockAdapter::new()
///     .with_latency(50)  // 50ms simulated latency
///     .with_max_connections(2);
/// ```
pub struct MockAdapter {
    /// Rows by relation name
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,

    /// Errors to return for specific relations
    errors: Arc<RwLock<HashMap<String, QueryError>>>,

    /// Every query received, in order
    queries: Arc<RwLock<Vec<String>>>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    max_connections: Option<usize>,
}

/// On-disk fixture format used by `type = "mock"` warehouses
#[derive(Debug, Default, Deserialize)]
struct MockFixture {
    #[serde(default)]
    tables: HashMap<String, Vec<Row>>,

    /// Relation name -> error message
    #[serde(default)]
    errors: HashMap<String, String>,
}

impl MockAdapter {
    /// Create a new mock adapter with no tables
    pub fn new() -> Self {
        MockAdapterBuilder::new().build()
    }

    /// Load tables and per-relation errors from a JSON fixture file
    ///
    /// ```json
    /// {
    ///   "tables": {"analytics.orders": [{"updated_at": "2024-01-01T00:00:00Z"}]},
    ///   "errors": {"analytics.restricted": "permission denied for table restricted"}
    /// }
    /// ```
    pub fn from_fixture_file(path: &Path) -> Result<Self, QueryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueryError::ConfigError(format!("Failed to read mock fixture {}: {}", path.display(), e))
        })?;

        let fixture: MockFixture = serde_json::from_str(&contents).map_err(|e| {
            QueryError::ConfigError(format!("Invalid mock fixture {}: {}", path.display(), e))
        })?;

        let mut builder = MockAdapterBuilder::new();
        for (relation, rows) in fixture.tables {
            builder = builder.with_table(&relation, rows);
        }
        for (relation, message) in fixture.errors {
            builder = builder.with_error(&relation, QueryError::QueryError(message));
        }
        Ok(builder.build())
    }

    /// Add or replace a table
    pub async fn add_table(&self, relation: &str, rows: Vec<Row>) {
        self.tables.write().await.insert(relation_key(relation), rows);
    }

    /// Append a row to an existing (or new) table
    pub async fn insert_row(&self, relation: &str, row: Row) {
        self.tables
            .write()
            .await
            .entry(relation_key(relation))
            .or_default()
            .push(row);
    }

    /// Set `column` to `value` on every row of a table
    pub async fn update_column(&self, relation: &str, column: &str, value: CellValue) {
        if let Some(rows) = self.tables.write().await.get_mut(&relation_key(relation)) {
            for row in rows {
                row.insert(column.to_string(), value.clone());
            }
        }
    }

    /// Configure an error to be returned for a specific relation
    pub async fn add_error_for_relation(&self, relation: &str, error: QueryError) {
        self.errors.write().await.insert(relation_key(relation), error);
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    ///
    /// This adds a delay before returning results, useful for testing
    /// timeout handling and parallelism.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Report a connection limit to the scheduler
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Get the number of tables stored in the adapter
    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }

    /// All queries executed so far
    pub async fn executed_queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }

    async fn run_freshness_query(&self, query: FreshnessQuery) -> Result<QueryResult, QueryError> {
        let key = query.relation;

        // Check for configured errors first
        if let Some(error) = self.errors.read().await.get(&key) {
            return Err(error.clone());
        }

        let tables = self.tables.read().await;
        let rows = tables
            .get(&key)
            .ok_or_else(|| QueryError::RelationNotFound(format!("relation \"{}\" does not exist", key)))?;

        let column = query.loaded_at;
        if !rows.is_empty() && !rows.iter().any(|row| row.contains_key(&column)) {
            return Err(QueryError::QueryError(format!("column \"{}\" does not exist", column)));
        }

        let mut max_loaded_at: Option<DateTime<Utc>> = None;
        for row in rows.iter().filter(|row| query.predicates.iter().all(|p| p.matches(row))) {
            let value = row.get(&column).unwrap_or(&CellValue::Null);
            if value.is_null() {
                continue;
            }
            let ts = value.as_timestamp().ok_or_else(|| {
                QueryError::QueryError(format!("column \"{}\" is not a timestamp: {:?}", column, value))
            })?;
            max_loaded_at = max_loaded_at.max(Some(ts));
        }

        let max_cell = max_loaded_at.map_or(CellValue::Null, CellValue::Timestamp);

        Ok(QueryResult {
            response: QueryResult::select_response(1),
            rows: vec![vec![max_cell, CellValue::Timestamp(Utc::now())]],
        })
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            errors: Arc::clone(&self.errors),
            queries: Arc::clone(&self.queries),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            max_connections: self.max_connections,
        }
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult, QueryError> {
        self.queries.write().await.push(sql.to_string());
        self.simulate_latency().await;

        let query = FreshnessQuery::parse(sql)?;
        self.run_freshness_query(query).await
    }

    async fn test_connection(&self) -> Result<(), QueryError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(QueryError::NetworkError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Builder for creating MockAdapter with multiple tables
///
/// # Example
///
/// ```rust,ignore
/// let adapter = MockAdapterBuilder::new()
///     .with_table("analytics.users", user_rows)
///     .with_table("analytics.orders", order_rows)
///     .with_error("analytics.restricted", QueryError::PermissionDenied("nope".into()))
///     .with_latency(50)
///     .build();
/// ```
pub struct MockAdapterBuilder {
    tables: HashMap<String, Vec<Row>>,
    errors: HashMap<String, QueryError>,
    fail_connection: bool,
    latency_ms: u64,
    max_connections: Option<usize>,
}

impl MockAdapterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
            max_connections: None,
        }
    }

    /// Add a table and its rows
    pub fn with_table(mut self, relation: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(relation_key(relation), rows);
        self
    }

    /// Add an error for a specific relation
    pub fn with_error(mut self, relation: &str, error: QueryError) -> Self {
        self.errors.insert(relation_key(relation), error);
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Build the MockAdapter
    pub fn build(self) -> MockAdapter {
        MockAdapter {
            tables: Arc::new(RwLock::new(self.tables)),
            errors: Arc::new(RwLock::new(self.errors)),
            queries: Arc::new(RwLock::new(Vec::new())),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            max_connections: self.max_connections,
        }
    }
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip identifier quoting so `"a"."b"` and `a.b` name the same table
fn relation_key(relation: &str) -> String {
    relation.chars().filter(|c| !matches!(c, '"' | '`')).collect()
}

/// The pieces of a freshness query the mock cares about
#[derive(Debug, PartialEq)]
struct FreshnessQuery {
    loaded_at: String,
    relation: String,
    predicates: Vec<Predicate>,
}

impl FreshnessQuery {
    fn parse(sql: &str) -> Result<Self, QueryError> {
        let unsupported = || {
            QueryError::QueryError(format!("mock adapter cannot execute query: {}", sql.trim()))
        };

        let statements = Parser::parse_sql(&GenericDialect {}, sql)
            .map_err(|e| QueryError::QueryError(format!("syntax error in freshness query: {}", e)))?;

        let [Statement::Query(query)] = statements.as_slice() else {
            return Err(unsupported());
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported());
        };

        let loaded_at = select
            .projection
            .first()
            .and_then(max_argument)
            .ok_or_else(unsupported)?;

        let relation = match select.from.as_slice() {
            [TableWithJoins {
                relation: TableFactor::Table { name, .. },
                joins,
                ..
            }] if joins.is_empty() => object_key(name),
            _ => return Err(unsupported()),
        };

        let mut predicates = Vec::new();
        if let Some(selection) = &select.selection {
            collect_predicates(selection, &mut predicates)?;
        }

        Ok(Self {
            loaded_at,
            relation,
            predicates,
        })
    }
}

/// Unquoted `a.b.c` key for a table name
fn object_key(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Column inside `max(<column>)`
fn max_argument(item: &SelectItem) -> Option<String> {
    let (SelectItem::ExprWithAlias { expr, .. } | SelectItem::UnnamedExpr(expr)) = item else {
        return None;
    };
    let Expr::Function(function) = expr else {
        return None;
    };
    if !function.name.to_string().eq_ignore_ascii_case("max") {
        return None;
    }
    let FunctionArguments::List(list) = &function.args else {
        return None;
    };
    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] => column_name(arg),
        _ => None,
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => idents.last().map(|ident| ident.value.clone()),
        Expr::Nested(inner) => column_name(inner),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn from_operator(op: &BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Eq => Some(Self::Eq),
            BinaryOperator::NotEq => Some(Self::NotEq),
            BinaryOperator::Lt => Some(Self::Lt),
            BinaryOperator::LtEq => Some(Self::LtEq),
            BinaryOperator::Gt => Some(Self::Gt),
            BinaryOperator::GtEq => Some(Self::GtEq),
            _ => None,
        }
    }

    /// The same comparison with its operands swapped
    fn flipped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            other => other,
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

impl Literal {
    fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Value(Value::Number(number, _)) => number.parse().ok().map(Self::Number),
            Expr::Value(Value::SingleQuotedString(text)) => Some(Self::Text(text.clone())),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match Self::from_expr(expr)? {
                Self::Number(n) => Some(Self::Number(-n)),
                Self::Text(_) => None,
            },
            Expr::Nested(inner) => Self::from_expr(inner),
            _ => None,
        }
    }
}

/// `column op literal`
#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    column: String,
    op: CompareOp,
    literal: Literal,
}

impl Predicate {
    fn from_comparison(left: &Expr, op: &BinaryOperator, right: &Expr) -> Option<Self> {
        let op = CompareOp::from_operator(op)?;
        if let (Some(column), Some(literal)) = (column_name(left), Literal::from_expr(right)) {
            return Some(Self { column, op, literal });
        }

        // `3 < id` is `id > 3`
        Some(Self {
            column: column_name(right)?,
            op: op.flipped(),
            literal: Literal::from_expr(left)?,
        })
    }

    /// SQL semantics: comparisons against null or incomparable values are false
    fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(&self.column) else {
            return false;
        };

        let ordering = match (cell, &self.literal) {
            (CellValue::Int(v), Literal::Number(n)) => (*v as f64).partial_cmp(n),
            (CellValue::Float(v), Literal::Number(n)) => v.partial_cmp(n),
            (CellValue::Timestamp(ts), Literal::Text(text)) => {
                parse_timestamp(text).map(|literal| ts.cmp(&literal))
            }
            (CellValue::Text(v), Literal::Text(text)) => match (parse_timestamp(v), parse_timestamp(text)) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => Some(v.as_str().cmp(text.as_str())),
            },
            (CellValue::Text(v), Literal::Number(n)) => v.parse::<f64>().ok().and_then(|v| v.partial_cmp(n)),
            _ => None,
        };

        ordering.is_some_and(|o| self.op.accepts(o))
    }
}

/// Flatten an `and` chain of comparisons
fn collect_predicates(expr: &Expr, predicates: &mut Vec<Predicate>) -> Result<(), QueryError> {
    match expr {
        Expr::Nested(inner) => collect_predicates(inner, predicates),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_predicates(left, predicates)?;
            collect_predicates(right, predicates)
        }
        Expr::BinaryOp { left, op, right } => {
            let predicate = Predicate::from_comparison(left, op, right).ok_or_else(|| {
                QueryError::QueryError(format!("syntax error in filter clause: {}", expr))
            })?;
            predicates.push(predicate);
            Ok(())
        }
        _ => Err(QueryError::QueryError(format!(
            "syntax error in filter clause: {}",
            expr
        ))),
    }
}
