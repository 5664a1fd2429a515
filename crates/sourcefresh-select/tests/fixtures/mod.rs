//! Shared fixtures for selection tests

use sourcefresh_dbt::{DependencyGraph, Manifest};

/// Three sources across two source blocks, three models, six tests
pub const MANIFEST: &str = include_str!("manifest.json");

pub fn graph() -> DependencyGraph {
    let manifest = Manifest::from_json(MANIFEST).expect("fixture manifest parses");
    DependencyGraph::from_manifest(&manifest).expect("fixture graph is acyclic")
}
