//! Dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency edges plus per-node selection
//! metadata. The graph is immutable once built.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use crate::manifest::{Manifest, ManifestError, ManifestNode, ManifestSource, ResourceType};

/// Node identifier (unique_id from manifest)
pub type NodeId = String;

/// Selection-relevant attributes of a graph node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub unique_id: NodeId,
    pub name: String,
    pub resource_type: ResourceType,
    pub package_name: String,
    pub fqn: Vec<String>,
    pub tags: BTreeSet<String>,

    /// Enclosing source name, for source nodes only
    pub source_name: Option<String>,
}

impl GraphNode {
    fn from_node(node: &ManifestNode) -> Self {
        let fqn = if node.fqn.is_empty() {
            vec![node.package_name.clone(), node.name.clone()]
        } else {
            node.fqn.clone()
        };

        Self {
            unique_id: node.unique_id.clone(),
            name: node.name.clone(),
            resource_type: node.resource_type,
            package_name: node.package_name.clone(),
            fqn,
            tags: node.tags.iter().chain(node.config.tags.iter()).cloned().collect(),
            source_name: None,
        }
    }

    fn from_source(source: &ManifestSource) -> Self {
        let fqn = if source.fqn.is_empty() {
            vec![
                source.package_name.clone(),
                source.source_name.clone(),
                source.name.clone(),
            ]
        } else {
            source.fqn.clone()
        };

        Self {
            unique_id: source.unique_id.clone(),
            name: source.name.clone(),
            resource_type: ResourceType::Source,
            package_name: source.package_name.clone(),
            fqn,
            tags: source.all_tags().cloned().collect(),
            source_name: Some(source.source_name.clone()),
        }
    }

    /// Builder used by tests and callers that assemble graphs by hand
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>, resource_type: ResourceType) -> Self {
        let name = name.into();
        Self {
            unique_id: unique_id.into(),
            fqn: vec![name.clone()],
            name,
            resource_type,
            package_name: String::new(),
            tags: BTreeSet::new(),
            source_name: None,
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package_name = package.into();
        self.fqn.insert(0, self.package_name.clone());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }
}

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Forward edges: node -> nodes it depends on (parents)
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: HashMap<NodeId, Vec<NodeId>>,

    /// All nodes in the graph
    nodes: BTreeMap<NodeId, GraphNode>,
}

impl DependencyGraph {
    /// Build a dependency graph from a manifest.
    ///
    /// Edges to ids that are neither a node nor a source (macros, disabled
    /// nodes) are dropped. A cyclic graph is rejected.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, ManifestError> {
        let mut graph = Self::default();

        for node in manifest.nodes.values().filter(|n| n.config.enabled) {
            graph.add_node(GraphNode::from_node(node));
        }

        for source in manifest.sources.values().filter(|s| s.config.enabled) {
            graph.add_node(GraphNode::from_source(source));
        }

        // Use parent_map from manifest if available
        if !manifest.parent_map.is_empty() {
            for (node_id, parent_ids) in &manifest.parent_map {
                for parent_id in parent_ids {
                    graph.add_edge(parent_id, node_id);
                }
            }
        } else {
            for (node_id, node) in &manifest.nodes {
                for dep_id in &node.depends_on.nodes {
                    graph.add_edge(dep_id, node_id);
                }
            }
        }

        graph.ensure_acyclic()?;
        Ok(graph)
    }

    /// Insert or replace a node
    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.unique_id.clone(), node);
    }

    /// Add an edge `parent -> child`; ignored unless both ends are known
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return;
        }

        let parents = self.parents.entry(child.to_string()).or_default();
        if parents.iter().any(|p| p == parent) {
            return;
        }
        parents.push(parent.to_string());

        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    /// Reject graphs with cycles
    pub fn ensure_acyclic(&self) -> Result<(), ManifestError> {
        match self.topological_sort() {
            Some(_) => Ok(()),
            None => {
                let ordered: BTreeSet<_> = self.topological_prefix().into_iter().collect();
                let remaining = self
                    .nodes
                    .keys()
                    .filter(|id| !ordered.contains(*id))
                    .cloned()
                    .collect();
                Err(ManifestError::CycleDetected(remaining))
            }
        }
    }

    /// Get all nodes in the graph
    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.parents
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Transitive dependencies of `node_id`, up to `depth` hops (all when `None`)
    pub fn ancestors(&self, node_id: &str, depth: Option<usize>) -> BTreeSet<NodeId> {
        Self::walk(&self.parents, node_id, depth)
    }

    /// Transitive dependents of `node_id`, up to `depth` hops (all when `None`)
    ///
    /// This is the "blast radius" - everything affected if this node changes.
    pub fn descendants(&self, node_id: &str, depth: Option<usize>) -> BTreeSet<NodeId> {
        Self::walk(&self.children, node_id, depth)
    }

    /// Breadth-first walk along one edge direction; the start node is excluded
    fn walk(edges: &HashMap<NodeId, Vec<NodeId>>, node_id: &str, depth: Option<usize>) -> BTreeSet<NodeId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((node_id.to_string(), 0usize));

        while let Some((current, distance)) = queue.pop_front() {
            if depth.is_some_and(|max| distance >= max) {
                continue;
            }

            let Some(next) = edges.get(&current) else {
                continue;
            };

            for neighbor in next {
                if neighbor != node_id && visited.insert(neighbor.clone()) {
                    queue.push_back((neighbor.clone(), distance + 1));
                }
            }
        }

        visited
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.descendants(source, None).contains(target)
    }

    /// Get topological sort of all nodes, or `None` if the graph has a cycle
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let result = self.topological_prefix();
        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }

    /// Kahn's algorithm; stops early at the first cycle
    fn topological_prefix(&self) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), self.parents.get(id).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            // For each child, decrease in-degree
            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        result
    }
}
