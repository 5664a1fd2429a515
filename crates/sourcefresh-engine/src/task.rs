//! The `source freshness` command
//!
//! Selection, criteria resolution, probing and aggregation wired together.
//! Probe failures never abort the task; only invalid input does.

use sourcefresh_catalog::WarehouseAdapter;
use sourcefresh_core::{Config, FreshnessReport};
use sourcefresh_dbt::{DependencyGraph, Manifest, ManifestError};
use sourcefresh_select::{parse_many, NodeSelector, SelectionPurpose, SelectorSyntaxError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::aggregator::{ReportError, ResultAggregator};
use crate::criteria::{CriteriaResolver, ResolvedFreshness};
use crate::prober::{FreshnessProber, Probe, ProbeJob};
use crate::scheduler::Scheduler;
use crate::vars::ProjectVars;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid selector: {0}")]
    Selector(#[from] SelectorSyntaxError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Command-line options for one run
#[derive(Debug, Clone, Default)]
pub struct FreshnessOptions {
    pub select: Vec<String>,
    pub exclude: Vec<String>,
    /// Overrides `threads` from the configuration
    pub threads: Option<usize>,
}

pub struct FreshnessTask {
    manifest: Manifest,
    adapter: Arc<dyn WarehouseAdapter>,
    vars: ProjectVars,
    threads: usize,
    query_timeout: Duration,
    aggregator: ResultAggregator,
    cancel: Option<watch::Receiver<bool>>,
}

impl FreshnessTask {
    pub fn new(config: &Config, manifest: Manifest, adapter: Arc<dyn WarehouseAdapter>) -> Self {
        Self {
            manifest,
            adapter,
            vars: ProjectVars::default(),
            threads: config.threads,
            query_timeout: config.query_timeout(),
            aggregator: ResultAggregator::new(config.env_capture.clone()),
            cancel: None,
        }
    }

    pub fn with_vars(mut self, vars: ProjectVars) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_aggregator(mut self, aggregator: ResultAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolve the probe jobs for `options` without touching the warehouse.
    ///
    /// Selected sources whose freshness is disabled are left out.
    pub fn plan(&self, options: &FreshnessOptions) -> Result<Vec<ProbeJob>, TaskError> {
        let graph = DependencyGraph::from_manifest(&self.manifest)?;
        let include = parse_many(&options.select)?;
        let exclude = parse_many(&options.exclude)?;

        let selected = NodeSelector::new(&graph).select(include.as_ref(), exclude.as_ref(), SelectionPurpose::Freshness);

        let mut jobs = Vec::with_capacity(selected.len());
        for unique_id in &selected {
            let Some(source) = self.manifest.get_source(unique_id) else {
                continue;
            };

            match CriteriaResolver::resolve(source) {
                ResolvedFreshness::Enabled {
                    criteria,
                    loaded_at_field,
                } => jobs.push(ProbeJob::for_source(source, loaded_at_field, criteria)),
                ResolvedFreshness::Disabled(reason) => {
                    tracing::debug!(unique_id = %unique_id, %reason, "Skipping source");
                }
            }
        }

        tracing::info!(
            selected = selected.len(),
            checked = jobs.len(),
            "Resolved sources for freshness"
        );
        Ok(jobs)
    }

    /// Probe every selected source and build the report
    pub async fn run(&self, options: &FreshnessOptions) -> Result<FreshnessReport, TaskError> {
        let started = Instant::now();
        let jobs = self.plan(options)?;

        let probe: Arc<dyn Probe> = Arc::new(FreshnessProber::new(
            Arc::clone(&self.adapter),
            self.vars.clone(),
            self.query_timeout,
        ));

        let mut scheduler = Scheduler::new(options.threads.unwrap_or(self.threads));
        if let Some(cancel) = &self.cancel {
            scheduler = scheduler.with_cancellation(cancel.clone());
        }

        let results = scheduler.run(jobs, probe).await;
        Ok(self.aggregator.finalize(results, started))
    }

    /// Persist a report produced by [`FreshnessTask::run`]
    pub fn write(&self, report: &FreshnessReport, path: &Path) -> Result<(), TaskError> {
        ResultAggregator::write(report, path)?;
        Ok(())
    }
}
