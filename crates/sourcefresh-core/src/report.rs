//! Freshness report schema (sources.json v3)
//!
//! This schema is consumed by downstream tooling.
//! Top-level keys, field names and timestamp formats must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::freshness::{FreshnessCriteria, FreshnessStatus};

/// Schema identifier written to `metadata.dbt_schema_version`
pub const SOURCES_SCHEMA_VERSION: &str = "https://schemas.getdbt.com/dbt/sources/v3.json";

/// Opaque adapter response echoed into each result
pub type AdapterResponse = serde_json::Map<String, serde_json::Value>;

/// Start/end of one phase of a probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingInfo {
    /// Phase name ("compile" or "execute")
    pub name: String,

    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "timestamp")]
    pub completed_at: DateTime<Utc>,
}

impl TimingInfo {
    pub fn new(name: impl Into<String>, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            started_at,
            completed_at,
        }
    }
}

/// Freshness outcome for a single source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessResult {
    pub unique_id: String,

    /// Newest value of the loaded-at field, if any row matched
    #[serde(with = "loaded_at")]
    pub max_loaded_at: Option<DateTime<Utc>>,

    /// Wall-clock time the check was evaluated
    #[serde(with = "timestamp")]
    pub snapshotted_at: DateTime<Utc>,

    pub max_loaded_at_time_ago_in_s: f64,

    pub status: FreshnessStatus,

    /// Resolved criteria, echoed verbatim
    pub criteria: FreshnessCriteria,

    pub adapter_response: AdapterResponse,

    pub thread_id: String,

    /// Wall-clock duration of the whole probe in seconds
    pub execution_time: f64,

    pub timing: Vec<TimingInfo>,
}

impl FreshnessResult {
    /// Message carried in `adapter_response._message`, if any
    pub fn message(&self) -> Option<&str> {
        self.adapter_response
            .get("_message")
            .and_then(|value| value.as_str())
    }
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    #[serde(with = "timestamp")]
    pub generated_at: DateTime<Utc>,

    pub dbt_schema_version: String,

    /// Version of the tool that wrote the report
    pub dbt_version: String,

    pub invocation_id: String,

    /// Captured custom environment variables (prefix stripped)
    pub env: BTreeMap<String, String>,
}

impl ReportMetadata {
    pub fn new(
        generated_at: DateTime<Utc>,
        dbt_version: impl Into<String>,
        invocation_id: impl Into<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            generated_at,
            dbt_schema_version: SOURCES_SCHEMA_VERSION.to_string(),
            dbt_version: dbt_version.into(),
            invocation_id: invocation_id.into(),
            env,
        }
    }
}

/// Counts per status. Not serialized into the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub warned: usize,
    pub errored: usize,
    pub runtime_errors: usize,
}

/// Freshness report (sources.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreshnessReport {
    pub metadata: ReportMetadata,

    pub results: Vec<FreshnessResult>,

    /// Seconds from command start until every probe completed
    pub elapsed_time: f64,
}

impl FreshnessReport {
    /// Worst status in the run, or `None` when nothing was probed
    pub fn worst_status(&self) -> Option<FreshnessStatus> {
        self.results.iter().map(|r| r.status).max()
    }

    /// True if any result is `error` or `runtime error`
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status.is_failure())
    }

    /// Look a result up by node id
    pub fn result_for(&self, unique_id: &str) -> Option<&FreshnessResult> {
        self.results.iter().find(|r| r.unique_id == unique_id)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.results.len(),
            ..ReportSummary::default()
        };

        for result in &self.results {
            match result.status {
                FreshnessStatus::Pass => summary.passed += 1,
                FreshnessStatus::Warn => summary.warned += 1,
                FreshnessStatus::Error => summary.errored += 1,
                FreshnessStatus::RuntimeError => summary.runtime_errors += 1,
            }
        }

        summary
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a previously written report
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// RFC 3339 UTC with microseconds and a `Z` suffix
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// `max_loaded_at`: RFC 3339 with a `+00:00` offset, fractional seconds
/// only when non-zero (`2016-09-19T14:45:51+00:00`)
pub mod loaded_at {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&format(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::Threshold;
    use chrono::TimeZone;

    fn result(unique_id: &str, status: FreshnessStatus) -> FreshnessResult {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        FreshnessResult {
            unique_id: unique_id.to_string(),
            max_loaded_at: Some(Utc.with_ymd_and_hms(2016, 9, 19, 14, 45, 51).unwrap()),
            snapshotted_at: at,
            max_loaded_at_time_ago_in_s: 1.5,
            status,
            criteria: FreshnessCriteria::new(Some(Threshold::hours(10)), Some(Threshold::hours(18))),
            adapter_response: AdapterResponse::new(),
            thread_id: "Thread-1".to_string(),
            execution_time: 0.25,
            timing: vec![
                TimingInfo::new("compile", at, at),
                TimingInfo::new("execute", at, at),
            ],
        }
    }

    fn report(results: Vec<FreshnessResult>) -> FreshnessReport {
        FreshnessReport {
            metadata: ReportMetadata::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
                "0.1.0",
                "abc",
                BTreeMap::from([("key".to_string(), "value".to_string())]),
            ),
            results,
            elapsed_time: 0.0,
        }
    }

    #[test]
    fn top_level_keys_are_exact() {
        let value = serde_json::to_value(report(vec![])).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["elapsed_time", "metadata", "results"]);

        assert_eq!(value["metadata"]["dbt_schema_version"], SOURCES_SCHEMA_VERSION);
        assert_eq!(value["metadata"]["env"]["key"], "value");
        assert!(value["elapsed_time"].is_f64());
    }

    #[test]
    fn timestamp_formats() {
        let value = serde_json::to_value(result("source.a.b.c", FreshnessStatus::Pass)).unwrap();
        assert_eq!(value["max_loaded_at"], "2016-09-19T14:45:51+00:00");
        assert_eq!(value["snapshotted_at"], "2024-01-01T12:00:00.000000Z");
        assert_eq!(value["timing"][0]["name"], "compile");
        assert_eq!(value["timing"][1]["name"], "execute");
        assert_eq!(value["adapter_response"], serde_json::json!({}));
    }

    #[test]
    fn null_max_loaded_at() {
        let mut r = result("source.a.b.c", FreshnessStatus::RuntimeError);
        r.max_loaded_at = None;
        let value = serde_json::to_value(&r).unwrap();
        assert!(value["max_loaded_at"].is_null());
        assert_eq!(value["status"], "runtime error");
    }

    #[test]
    fn failures_and_summary() {
        let warn_only = report(vec![
            result("a", FreshnessStatus::Pass),
            result("b", FreshnessStatus::Warn),
        ]);
        assert!(!warn_only.has_failures());
        assert_eq!(warn_only.worst_status(), Some(FreshnessStatus::Warn));

        let failing = report(vec![
            result("a", FreshnessStatus::Pass),
            result("b", FreshnessStatus::RuntimeError),
            result("c", FreshnessStatus::Error),
        ]);
        assert!(failing.has_failures());

        let summary = failing.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.runtime_errors, 1);

        assert!(report(vec![]).worst_status().is_none());
    }

    #[test]
    fn json_roundtrip_preserves_results() {
        let original = report(vec![result("source.test.test_source.test_table", FreshnessStatus::Warn)]);
        let parsed = FreshnessReport::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.result_for("source.test.test_source.test_table").is_some());
    }
}
