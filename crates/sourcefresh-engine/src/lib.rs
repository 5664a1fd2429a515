//! SourceFresh engine - source freshness evaluation
//!
//! This crate implements the freshness pipeline:
//! - Criteria resolution across source, table and node-override levels
//! - Per-source max-timestamp probes with timing capture
//! - Bounded-parallel scheduling with per-node failure isolation
//! - Report aggregation and serialization

pub mod criteria;
pub mod vars;
pub mod prober;
pub mod scheduler;
pub mod aggregator;
pub mod task;

pub use criteria::{CriteriaResolver, DisabledReason, ResolvedFreshness};
pub use vars::{ProjectVars, VarsError};
pub use prober::{FreshnessProber, Probe, ProbeJob};
pub use scheduler::Scheduler;
pub use aggregator::{ReportError, ResultAggregator};
pub use task::{FreshnessOptions, FreshnessTask, TaskError};
