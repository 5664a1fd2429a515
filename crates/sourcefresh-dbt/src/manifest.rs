//! dbt manifest.json parsing
//!
//! Parses the manifest to extract models, sources, their dependencies, and
//! the raw per-level freshness declarations of every source.

use serde::{Deserialize, Serialize};
use sourcefresh_core::freshness::{explicit, FreshnessDeclaration};
use std::collections::HashMap;
use std::path::Path;

/// dbt manifest.json structure (subset of fields we care about)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    #[serde(default)]
    pub metadata: ManifestMetadata,

    /// Model, seed, test, ... nodes
    #[serde(default)]
    pub nodes: HashMap<String, ManifestNode>,

    /// Source table definitions
    #[serde(default)]
    pub sources: HashMap<String, ManifestSource>,

    /// Parent map (node -> list of parent nodes)
    #[serde(default)]
    pub parent_map: HashMap<String, Vec<String>>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_json(&contents)
    }

    /// Parse and validate a manifest from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check structural invariants the rest of the pipeline relies on
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (key, node) in &self.nodes {
            if key != &node.unique_id {
                return Err(ManifestError::KeyMismatch(key.clone(), node.unique_id.clone()));
            }
        }

        for (key, source) in &self.sources {
            if key != &source.unique_id {
                return Err(ManifestError::KeyMismatch(key.clone(), source.unique_id.clone()));
            }

            for declaration in source.declarations() {
                if declaration.thresholds().any(|t| t.count == 0) {
                    return Err(ManifestError::InvalidFreshness {
                        unique_id: source.unique_id.clone(),
                        reason: "threshold count must be greater than zero".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Get a specific source by unique_id
    pub fn get_source(&self, unique_id: &str) -> Option<&ManifestSource> {
        self.sources.get(unique_id)
    }
}

/// Manifest metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub dbt_schema_version: String,
    #[serde(default)]
    pub dbt_version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Model,
    Seed,
    Test,
    Snapshot,
    Analysis,
    Operation,
    Exposure,
    Source,
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Seed => "seed",
            Self::Test => "test",
            Self::Snapshot => "snapshot",
            Self::Analysis => "analysis",
            Self::Operation => "operation",
            Self::Exposure => "exposure",
            Self::Source => "source",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(Self::Model),
            "seed" => Ok(Self::Seed),
            "test" => Ok(Self::Test),
            "snapshot" => Ok(Self::Snapshot),
            "analysis" => Ok(Self::Analysis),
            "operation" => Ok(Self::Operation),
            "exposure" => Ok(Self::Exposure),
            "source" => Ok(Self::Source),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}

/// A node in the manifest (model, test, snapshot, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.my_project.users")
    pub unique_id: String,

    /// Node name (e.g., "users")
    pub name: String,

    pub resource_type: ResourceType,

    #[serde(default)]
    pub package_name: String,

    /// Node configuration
    #[serde(default)]
    pub config: NodeConfig,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Dependencies
    #[serde(default)]
    pub depends_on: DependsOn,

    /// Fully qualified name
    #[serde(default)]
    pub fqn: Vec<String>,
}

/// Node configuration (from dbt_project.yml or model config)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Whether the node is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tags: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Source-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Node-level freshness override (highest precedence)
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Option<FreshnessDeclaration>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            freshness: None,
        }
    }
}

/// Identifier quoting policy for a source relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quoting {
    #[serde(default = "default_true")]
    pub database: bool,
    #[serde(default = "default_true")]
    pub schema: bool,
    #[serde(default = "default_true")]
    pub identifier: bool,
}

impl Default for Quoting {
    fn default() -> Self {
        Self {
            database: true,
            schema: true,
            identifier: true,
        }
    }
}

/// A source table in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.my_project.raw.users")
    pub unique_id: String,

    /// Source name (e.g., "raw")
    pub source_name: String,

    /// Table name (e.g., "users")
    pub name: String,

    #[serde(default)]
    pub package_name: String,

    #[serde(default)]
    pub database: Option<String>,

    pub schema: String,

    /// Identifier (actual table name), defaults to `name`
    #[serde(default)]
    pub identifier: Option<String>,

    #[serde(default)]
    pub quoting: Quoting,

    /// Table-level loaded-at column or expression
    #[serde(default)]
    pub loaded_at_field: Option<String>,

    /// Source-level loaded-at default
    #[serde(default)]
    pub source_loaded_at_field: Option<String>,

    /// Source-level freshness default
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub source_freshness: Option<Option<FreshnessDeclaration>>,

    /// Table-level freshness declaration
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Option<FreshnessDeclaration>>,

    #[serde(default)]
    pub config: SourceConfig,

    /// Table-level tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Tags declared on the enclosing source
    #[serde(default)]
    pub source_tags: Vec<String>,

    #[serde(default)]
    pub fqn: Vec<String>,
}

impl ManifestSource {
    /// Physical table name
    pub fn identifier(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.name)
    }

    /// Every declaration level present on this source, highest precedence first
    pub fn declarations(&self) -> impl Iterator<Item = &FreshnessDeclaration> {
        [&self.config.freshness, &self.freshness, &self.source_freshness]
            .into_iter()
            .filter_map(|level| level.as_ref().and_then(Option::as_ref))
    }

    /// Source and table tags combined
    pub fn all_tags(&self) -> impl Iterator<Item = &String> {
        self.source_tags.iter().chain(self.tags.iter())
    }
}

/// Manifest parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),

    #[error("Manifest key '{0}' does not match unique_id '{1}'")]
    KeyMismatch(String, String),

    #[error("Invalid freshness configuration on {unique_id}: {reason}")]
    InvalidFreshness { unique_id: String, reason: String },

    #[error("Dependency graph contains a cycle through: {}", .0.join(", "))]
    CycleDetected(Vec<String>),
}
