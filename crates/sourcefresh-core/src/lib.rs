//! SourceFresh Core
//!
//! Core domain model: freshness criteria, result and report types, and
//! configuration. The report types define the on-disk sources.json format
//! and must stay stable.

pub mod freshness;
pub mod report;
pub mod config;
pub mod env;

pub use freshness::{FreshnessCriteria, FreshnessDeclaration, FreshnessStatus, Threshold, TimePeriod};
pub use report::{
    AdapterResponse, FreshnessReport, FreshnessResult, ReportMetadata, ReportSummary, TimingInfo,
    SOURCES_SCHEMA_VERSION,
};
pub use config::{Config, ConfigError, WarehouseConfig};
pub use env::{EnvCaptureConfig, DEFAULT_CUSTOM_ENV_PREFIX};
