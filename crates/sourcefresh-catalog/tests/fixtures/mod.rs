//! Test fixtures for warehouse adapter integration tests
//!
//! Row builders for the loaded-at tables the freshness queries run against.

use chrono::{DateTime, Duration, Utc};
use sourcefresh_catalog::{CellValue, Row};

/// A row with an `id` and an `updated_at` timestamp
pub fn loaded_row(id: i64, updated_at: DateTime<Utc>) -> Row {
    Row::from([
        ("id".to_string(), CellValue::Int(id)),
        ("updated_at".to_string(), CellValue::Timestamp(updated_at)),
    ])
}

/// `count` rows loaded one hour apart, the newest `age` ago
pub fn hourly_rows(count: i64, age: Duration) -> Vec<Row> {
    let newest = Utc::now() - age;
    (0..count)
        .map(|i| loaded_row(i + 1, newest - Duration::hours(count - 1 - i)))
        .collect()
}

/// Rows where the loaded-at column is sometimes null
pub fn rows_with_nulls(newest: DateTime<Utc>) -> Vec<Row> {
    vec![
        loaded_row(1, newest - Duration::hours(3)),
        Row::from([
            ("id".to_string(), CellValue::Int(2)),
            ("updated_at".to_string(), CellValue::Null),
        ]),
        loaded_row(3, newest),
    ]
}

/// Freshness query in the shape the engine emits
pub fn freshness_sql(relation: &str, filter: Option<&str>) -> String {
    let mut sql = format!(
        "select max(\"updated_at\") as max_loaded_at, current_timestamp as snapshotted_at from {}",
        relation
    );
    if let Some(filter) = filter {
        sql.push_str(" where ");
        sql.push_str(filter);
    }
    sql
}
