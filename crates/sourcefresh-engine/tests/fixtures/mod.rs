//! Shared fixtures for freshness tests

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sourcefresh_catalog::{CellValue, Row};
use sourcefresh_dbt::Manifest;

/// Rows whose newest `updated_at` is `age_hours` old
pub fn rows_aged(age_hours: i64) -> Vec<Row> {
    [age_hours + 48, age_hours + 24, age_hours]
        .iter()
        .enumerate()
        .map(|(i, age)| {
            Row::from([
                ("id".to_string(), CellValue::Int(i as i64 + 1)),
                ("updated_at".to_string(), CellValue::Timestamp(Utc::now() - Duration::hours(*age))),
            ])
        })
        .collect()
}

/// warn after 10 hours, error after 18 hours
pub fn default_freshness() -> Value {
    json!({
        "warn_after": {"count": 10, "period": "hour"},
        "error_after": {"count": 18, "period": "hour"}
    })
}

/// A source table `analytics.<name>` in source block `test_source`
pub fn source(name: &str, freshness: Value) -> (String, Value) {
    let unique_id = format!("source.test.test_source.{}", name);
    let source = json!({
        "unique_id": unique_id,
        "source_name": "test_source",
        "name": name,
        "package_name": "test",
        "schema": "analytics",
        "loaded_at_field": "updated_at",
        "freshness": freshness,
        "fqn": ["test", "test_source", name]
    });
    (unique_id, source)
}

pub fn manifest(sources: Vec<(String, Value)>) -> Manifest {
    let sources: serde_json::Map<String, Value> = sources.into_iter().collect();
    Manifest::from_json(&json!({ "nodes": {}, "sources": sources }).to_string())
        .expect("fixture manifest parses")
}
