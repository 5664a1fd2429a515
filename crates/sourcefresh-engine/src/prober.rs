//! Freshness probes
//!
//! A probe compiles the max-timestamp query for one source, runs it through
//! the warehouse adapter and classifies the age of the newest row. Every
//! failure is captured in the result; nothing is propagated to the caller.

use chrono::{DateTime, Utc};
use sourcefresh_catalog::{CellValue, QueryError, QueryResult, QuotePolicy, Relation, WarehouseAdapter};
use sourcefresh_core::{AdapterResponse, FreshnessCriteria, FreshnessResult, FreshnessStatus, TimingInfo};
use sourcefresh_dbt::ManifestSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::vars::ProjectVars;

/// Everything needed to probe one source, resolved before dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeJob {
    pub unique_id: String,
    pub relation: Relation,
    pub loaded_at_field: String,
    pub criteria: FreshnessCriteria,
}

impl ProbeJob {
    pub fn for_source(source: &ManifestSource, loaded_at_field: String, criteria: FreshnessCriteria) -> Self {
        let relation = Relation::new(source.database.clone(), &source.schema, source.identifier())
            .with_quoting(QuotePolicy {
                database: source.quoting.database,
                schema: source.quoting.schema,
                identifier: source.quoting.identifier,
            });

        Self {
            unique_id: source.unique_id.clone(),
            relation,
            loaded_at_field,
            criteria,
        }
    }

    /// A `runtime error` result that carries `message` and zero-length timing
    pub fn runtime_error(&self, thread_id: &str, message: String) -> FreshnessResult {
        let now = Utc::now();
        failed_result(
            self,
            thread_id,
            message,
            vec![TimingInfo::new("compile", now, now), TimingInfo::new("execute", now, now)],
            0.0,
        )
    }
}

/// Runs a single freshness check
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, job: &ProbeJob, thread_id: &str) -> FreshnessResult;

    /// Upper bound on concurrent probes, if the backing service has one
    fn max_concurrency(&self) -> Option<usize> {
        None
    }
}

/// Probe backed by a warehouse adapter
pub struct FreshnessProber {
    adapter: Arc<dyn WarehouseAdapter>,
    vars: ProjectVars,
    query_timeout: Duration,
}

impl FreshnessProber {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, vars: ProjectVars, query_timeout: Duration) -> Self {
        Self {
            adapter,
            vars,
            query_timeout,
        }
    }

    /// Build the freshness query for a job, substituting `var()` references
    pub fn compile(&self, job: &ProbeJob) -> Result<String, String> {
        let render = |template: &str| {
            self.vars
                .render(template)
                .map_err(|e| format!("Compilation error in {}: {}", job.unique_id, e))
        };

        let loaded_at = render(&job.loaded_at_field)?;
        let mut sql = format!(
            "select max({}) as max_loaded_at, {} as snapshotted_at from {}",
            loaded_at,
            self.adapter.current_timestamp(),
            job.relation.render(self.adapter.as_ref())
        );

        if let Some(filter) = &job.criteria.filter {
            sql.push_str(" where ");
            sql.push_str(&render(filter)?);
        }

        Ok(sql)
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult, QueryError> {
        match tokio::time::timeout(self.query_timeout, self.adapter.execute(sql)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(self.query_timeout.as_secs())),
        }
    }
}

#[async_trait::async_trait]
impl Probe for FreshnessProber {
    async fn probe(&self, job: &ProbeJob, thread_id: &str) -> FreshnessResult {
        let started = Instant::now();
        tracing::debug!(unique_id = %job.unique_id, thread_id, "Checking source freshness");

        let compile_started = Utc::now();
        let compiled = self.compile(job);
        let compile_completed = Utc::now();
        let mut timing = vec![TimingInfo::new("compile", compile_started, compile_completed)];

        let sql = match compiled {
            Ok(sql) => sql,
            Err(message) => {
                timing.push(TimingInfo::new("execute", compile_completed, compile_completed));
                tracing::warn!(unique_id = %job.unique_id, "{}", message);
                return failed_result(job, thread_id, message, timing, started.elapsed().as_secs_f64());
            }
        };

        let execute_started = Utc::now();
        let outcome = self.execute(&sql).await;
        let execute_completed = Utc::now();
        timing.push(TimingInfo::new("execute", execute_started, execute_completed));

        let result = match outcome {
            Ok(query) => classify(job, thread_id, query, execute_completed, timing, started),
            Err(err) => {
                if matches!(err, QueryError::Timeout(_)) {
                    tracing::warn!(unique_id = %job.unique_id, "Freshness query timed out");
                }
                let message = format!("Failed to check freshness of {}: {}", job.unique_id, err);
                failed_result(job, thread_id, message, timing, started.elapsed().as_secs_f64())
            }
        };

        tracing::debug!(
            unique_id = %job.unique_id,
            status = %result.status,
            execution_time = result.execution_time,
            "Finished freshness check"
        );
        result
    }

    fn max_concurrency(&self) -> Option<usize> {
        self.adapter.max_connections()
    }
}

/// Turn a successful query into a classified result.
///
/// The age is measured against the warehouse's `snapshotted_at` when it
/// decodes, falling back to the local clock.
fn classify(
    job: &ProbeJob,
    thread_id: &str,
    query: QueryResult,
    completed_at: DateTime<Utc>,
    timing: Vec<TimingInfo>,
    started: Instant,
) -> FreshnessResult {
    let max_loaded_at = match query.cell(0, 0) {
        Some(CellValue::Null) => {
            let message = format!(
                "Freshness query for {} returned null max_loaded_at (no rows matched)",
                job.unique_id
            );
            return failed_result(job, thread_id, message, timing, started.elapsed().as_secs_f64());
        }
        Some(cell) => match cell.as_timestamp() {
            Some(ts) => ts,
            None => {
                let message = format!(
                    "Freshness query for {} returned a non-timestamp max_loaded_at: {:?}",
                    job.unique_id, cell
                );
                return failed_result(job, thread_id, message, timing, started.elapsed().as_secs_f64());
            }
        },
        None => {
            let message = format!("Freshness query for {} returned no rows", job.unique_id);
            return failed_result(job, thread_id, message, timing, started.elapsed().as_secs_f64());
        }
    };

    let snapshotted_at = query
        .cell(0, 1)
        .and_then(CellValue::as_timestamp)
        .unwrap_or(completed_at);

    let age = (snapshotted_at - max_loaded_at)
        .num_microseconds()
        .map_or(f64::MAX, |us| us as f64 / 1_000_000.0)
        .max(0.0);

    tracing::debug!(unique_id = %job.unique_id, response = ?query.response, "Freshness query completed");

    // Successful results carry an empty adapter response
    FreshnessResult {
        unique_id: job.unique_id.clone(),
        max_loaded_at: Some(max_loaded_at),
        snapshotted_at,
        max_loaded_at_time_ago_in_s: age,
        status: job.criteria.classify(age),
        criteria: job.criteria.clone(),
        adapter_response: AdapterResponse::new(),
        thread_id: thread_id.to_string(),
        execution_time: started.elapsed().as_secs_f64(),
        timing,
    }
}

fn failed_result(
    job: &ProbeJob,
    thread_id: &str,
    message: String,
    timing: Vec<TimingInfo>,
    execution_time: f64,
) -> FreshnessResult {
    let mut adapter_response = AdapterResponse::new();
    adapter_response.insert("_message".to_string(), message.into());

    FreshnessResult {
        unique_id: job.unique_id.clone(),
        max_loaded_at: None,
        snapshotted_at: Utc::now(),
        max_loaded_at_time_ago_in_s: 0.0,
        status: FreshnessStatus::RuntimeError,
        criteria: job.criteria.clone(),
        adapter_response,
        thread_id: thread_id.to_string(),
        execution_time,
        timing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use sourcefresh_catalog::{MockAdapterBuilder, Row};
    use sourcefresh_core::Threshold;

    fn job(filter: Option<&str>) -> ProbeJob {
        let mut criteria = FreshnessCriteria::new(Some(Threshold::hours(10)), Some(Threshold::hours(18)));
        criteria.filter = filter.map(str::to_string);
        ProbeJob {
            unique_id: "source.test.test_source.test_table".to_string(),
            relation: Relation::new(None, "analytics", "source"),
            loaded_at_field: "updated_at".to_string(),
            criteria,
        }
    }

    fn rows(ages_hours: &[i64]) -> Vec<Row> {
        ages_hours
            .iter()
            .enumerate()
            .map(|(i, age)| {
                Row::from([
                    ("id".to_string(), CellValue::Int(i as i64 + 1)),
                    ("updated_at".to_string(), CellValue::Timestamp(Utc::now() - ChronoDuration::hours(*age))),
                ])
            })
            .collect()
    }

    fn prober(adapter: sourcefresh_catalog::MockAdapter) -> FreshnessProber {
        FreshnessProber::new(Arc::new(adapter), ProjectVars::default(), Duration::from_secs(5))
    }

    #[test]
    fn compiles_quoted_query_with_filter() {
        let prober = prober(MockAdapterBuilder::new().build());
        let vars = ProjectVars::from_yaml("{min_id: 2}").unwrap();
        let prober = FreshnessProber { vars, ..prober };

        let sql = prober.compile(&job(Some("id >= {{ var('min_id') }}"))).unwrap();
        assert_eq!(
            sql,
            "select max(updated_at) as max_loaded_at, current_timestamp as snapshotted_at \
             from \"analytics\".\"source\" where id >= 2"
        );
    }

    #[tokio::test]
    async fn classifies_by_age() {
        for (age, expected) in [(2, FreshnessStatus::Pass), (12, FreshnessStatus::Warn), (24, FreshnessStatus::Error)] {
            let adapter = MockAdapterBuilder::new()
                .with_table("analytics.source", rows(&[age + 5, age]))
                .build();
            let result = prober(adapter).probe(&job(None), "Thread-1").await;

            assert_eq!(result.status, expected, "age {}h", age);
            assert!(result.max_loaded_at.is_some());
            let expected_age = (age * 3600) as f64;
            assert!((result.max_loaded_at_time_ago_in_s - expected_age).abs() < 60.0);
            assert_eq!(result.thread_id, "Thread-1");
            let names: Vec<_> = result.timing.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(names, vec!["compile", "execute"]);
        }
    }

    #[tokio::test]
    async fn filter_excluding_all_rows_is_runtime_error() {
        let adapter = MockAdapterBuilder::new()
            .with_table("analytics.source", rows(&[1, 2]))
            .build();
        let result = prober(adapter).probe(&job(Some("id > 100")), "Thread-1").await;

        assert_eq!(result.status, FreshnessStatus::RuntimeError);
        assert_eq!(result.max_loaded_at, None);
        assert!(result.message().unwrap().contains("null max_loaded_at"));
    }

    #[tokio::test]
    async fn query_failure_is_captured() {
        let result = prober(MockAdapterBuilder::new().build()).probe(&job(None), "Thread-2").await;
        assert_eq!(result.status, FreshnessStatus::RuntimeError);
        let message = result.message().unwrap();
        assert!(message.contains("source.test.test_source.test_table"));
        assert!(message.contains("does not exist"));
    }

    #[tokio::test]
    async fn unknown_var_is_runtime_error() {
        let adapter = MockAdapterBuilder::new()
            .with_table("analytics.source", rows(&[1]))
            .build();
        let mut job = job(None);
        job.loaded_at_field = "{{ var('ts_column') }}".to_string();

        let result = prober(adapter.clone()).probe(&job, "Thread-1").await;
        assert_eq!(result.status, FreshnessStatus::RuntimeError);
        assert!(result.message().unwrap().contains("ts_column"));
        assert_eq!(result.timing.len(), 2);
        assert!(adapter.executed_queries().await.is_empty());
    }

    #[tokio::test]
    async fn slow_query_times_out() {
        let adapter = MockAdapterBuilder::new()
            .with_table("analytics.source", rows(&[1]))
            .with_latency(500)
            .build();
        let prober = FreshnessProber::new(Arc::new(adapter), ProjectVars::default(), Duration::from_millis(20));

        let result = prober.probe(&job(None), "Thread-1").await;
        assert_eq!(result.status, FreshnessStatus::RuntimeError);
        assert!(result.message().unwrap().contains("timed out"));
    }

    #[test]
    fn job_from_manifest_source() {
        let manifest = sourcefresh_dbt::Manifest::from_json(
            r#"{"sources": {"source.p.raw.orders": {
                "unique_id": "source.p.raw.orders", "source_name": "raw", "name": "orders",
                "database": "warehouse", "schema": "raw", "identifier": "orders_v2",
                "quoting": {"identifier": false}
            }}}"#,
        )
        .unwrap();
        let source = manifest.get_source("source.p.raw.orders").unwrap();
        let job = ProbeJob::for_source(source, "updated_at".to_string(), FreshnessCriteria::default());

        assert_eq!(job.relation.fqn(), "warehouse.raw.orders_v2");
        assert!(!job.relation.quoting.identifier);
        assert!(job.relation.quoting.schema);
    }
}
