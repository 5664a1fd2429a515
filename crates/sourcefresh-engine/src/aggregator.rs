//! Report aggregation
//!
//! Collects probe results into a [`FreshnessReport`] with run metadata and
//! writes it as `sources.json`.

use chrono::Utc;
use sourcefresh_core::{EnvCaptureConfig, FreshnessReport, FreshnessResult, ReportMetadata};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to serialize freshness report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write freshness report to {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

pub struct ResultAggregator {
    env_capture: EnvCaptureConfig,
    env_override: Option<BTreeMap<String, String>>,
    version: String,
    invocation_id: String,
}

impl ResultAggregator {
    pub fn new(env_capture: EnvCaptureConfig) -> Self {
        Self {
            env_capture,
            env_override: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            invocation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    /// Capture from `vars` instead of the process environment
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.env_override = Some(self.env_capture.capture(vars));
        self
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Build the report. Results are ordered by `unique_id` so that two runs
    /// over the same warehouse state produce comparable output.
    pub fn finalize(&self, mut results: Vec<FreshnessResult>, started: Instant) -> FreshnessReport {
        results.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));

        let env = self
            .env_override
            .clone()
            .unwrap_or_else(|| self.env_capture.capture_process_env());

        FreshnessReport {
            metadata: ReportMetadata::new(Utc::now(), &self.version, &self.invocation_id, env),
            results,
            elapsed_time: started.elapsed().as_secs_f64(),
        }
    }

    /// Write `report` to `path`, creating parent directories
    pub fn write(report: &FreshnessReport, path: &Path) -> Result<(), ReportError> {
        let json = report.to_json()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ReportError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        std::fs::write(path, json).map_err(|e| ReportError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), results = report.results.len(), "Wrote freshness report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sourcefresh_core::{AdapterResponse, FreshnessCriteria, FreshnessStatus, SOURCES_SCHEMA_VERSION};

    fn result(id: &str, status: FreshnessStatus) -> FreshnessResult {
        FreshnessResult {
            unique_id: id.to_string(),
            max_loaded_at: Some(Utc::now()),
            snapshotted_at: Utc::now(),
            max_loaded_at_time_ago_in_s: 1.0,
            status,
            criteria: FreshnessCriteria::default(),
            adapter_response: AdapterResponse::new(),
            thread_id: "Thread-1".to_string(),
            execution_time: 0.1,
            timing: Vec::new(),
        }
    }

    #[test]
    fn finalize_orders_results_and_fills_metadata() {
        let aggregator = ResultAggregator::new(EnvCaptureConfig::default().with_case_insensitive(false))
            .with_version("1.2.3")
            .with_invocation_id("abc")
            .with_env_vars([("DBT_ENV_CUSTOM_ENV_team", "data"), ("HOME", "/root")]);

        let report = aggregator.finalize(
            vec![
                result("source.p.s.b", FreshnessStatus::Warn),
                result("source.p.s.a", FreshnessStatus::Pass),
            ],
            Instant::now(),
        );

        let ids: Vec<_> = report.results.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(ids, vec!["source.p.s.a", "source.p.s.b"]);
        assert_eq!(report.metadata.dbt_schema_version, SOURCES_SCHEMA_VERSION);
        assert_eq!(report.metadata.dbt_version, "1.2.3");
        assert_eq!(report.metadata.invocation_id, "abc");
        assert_eq!(
            report.metadata.env,
            BTreeMap::from([("team".to_string(), "data".to_string())])
        );
        assert!(report.elapsed_time >= 0.0);
    }

    #[test]
    fn invocation_ids_are_unique() {
        let a = ResultAggregator::new(EnvCaptureConfig::default());
        let b = ResultAggregator::new(EnvCaptureConfig::default());
        assert_ne!(a.invocation_id(), b.invocation_id());
    }

    #[test]
    fn write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target").join("sources.json");
        let report = ResultAggregator::new(EnvCaptureConfig::default())
            .with_env_vars(Vec::<(String, String)>::new())
            .finalize(vec![result("source.p.s.a", FreshnessStatus::Error)], Instant::now());

        ResultAggregator::write(&report, &path).unwrap();

        let parsed = FreshnessReport::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].status, FreshnessStatus::Error);
    }

    #[test]
    fn write_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let report = ResultAggregator::new(EnvCaptureConfig::default())
            .with_env_vars(Vec::<(String, String)>::new())
            .finalize(Vec::new(), Instant::now());
        let err = ResultAggregator::write(&report, &blocker.join("sources.json")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }
}
