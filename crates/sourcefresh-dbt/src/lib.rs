//! dbt artifact parsing and DAG construction
//!
//! This crate handles:
//! - Parsing manifest.json (dbt-generated artifacts)
//! - Building dependency graphs (DAG) over models and sources
//! - Ancestor/descendant traversal for graph selection

pub mod manifest;
pub mod dag;

pub use manifest::{
    DependsOn, Manifest, ManifestError, ManifestMetadata, ManifestNode, ManifestSource, NodeConfig,
    Quoting, ResourceType, SourceConfig,
};
pub use dag::{DependencyGraph, GraphNode, NodeId};
