//! Graph selection
//!
//! Evaluates a [`SelectionExpression`] against the dependency graph:
//! match seeds, expand along edges, combine groups, subtract excludes,
//! then filter by what the calling command acts on.

use sourcefresh_dbt::{DependencyGraph, NodeId, ResourceType};
use std::collections::BTreeSet;

use crate::expression::{SelectionCriteria, SelectionExpression};

/// What the calling command operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPurpose {
    /// Freshness checks: only source nodes survive
    Freshness,
    /// Build-style commands: source nodes are dropped
    Execution,
}

impl SelectionPurpose {
    pub fn keeps(&self, resource_type: ResourceType) -> bool {
        match self {
            Self::Freshness => resource_type == ResourceType::Source,
            Self::Execution => resource_type != ResourceType::Source,
        }
    }
}

/// Evaluates selection expressions against a graph
pub struct NodeSelector<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> NodeSelector<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Resolve the node set for a command.
    ///
    /// A missing `include` selects every node. The exclude set is expanded
    /// along the graph the same way before it is subtracted.
    pub fn select(
        &self,
        include: Option<&SelectionExpression>,
        exclude: Option<&SelectionExpression>,
        purpose: SelectionPurpose,
    ) -> BTreeSet<NodeId> {
        let mut selected = match include {
            Some(expr) => self.evaluate(expr),
            None => self.graph.all_nodes().map(|n| n.unique_id.clone()).collect(),
        };

        if let Some(expr) = exclude {
            let excluded = self.evaluate(expr);
            tracing::debug!(excluded = excluded.len(), "Applying exclude selection");
            selected.retain(|id| !excluded.contains(id));
        }

        selected.retain(|id| {
            self.graph
                .node(id)
                .is_some_and(|node| purpose.keeps(node.resource_type))
        });

        tracing::debug!(selected = selected.len(), ?purpose, "Resolved node selection");
        selected
    }

    /// Evaluate an expression without purpose filtering
    pub fn evaluate(&self, expr: &SelectionExpression) -> BTreeSet<NodeId> {
        match expr {
            SelectionExpression::Criteria(criteria) => self.evaluate_criteria(criteria),
            SelectionExpression::Union(members) => members
                .iter()
                .flat_map(|member| self.evaluate(member))
                .collect(),
            SelectionExpression::Intersection(members) => {
                let mut sets = members.iter().map(|member| self.evaluate(member));
                let Some(first) = sets.next() else {
                    return BTreeSet::new();
                };
                sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect())
            }
        }
    }

    fn evaluate_criteria(&self, criteria: &SelectionCriteria) -> BTreeSet<NodeId> {
        let seeds: BTreeSet<NodeId> = self
            .graph
            .all_nodes()
            .filter(|node| criteria.matcher.matches(node))
            .map(|node| node.unique_id.clone())
            .collect();

        if seeds.is_empty() {
            tracing::debug!(term = %criteria.raw, "Selector matched no nodes");
        }

        let mut selected = seeds.clone();

        for seed in &seeds {
            if criteria.parents {
                selected.extend(self.graph.ancestors(seed, criteria.parents_depth));
            }
            if criteria.children {
                selected.extend(self.graph.descendants(seed, criteria.children_depth));
            }
            if criteria.childrens_parents {
                selected.extend(self.graph.ancestors(seed, None));
                let descendants = self.graph.descendants(seed, None);
                for descendant in &descendants {
                    selected.extend(self.graph.ancestors(descendant, None));
                }
                selected.extend(descendants);
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use sourcefresh_dbt::GraphNode;

    // raw.orders -> stg_orders -> orders
    // seeds.lookup --------------/
    fn graph() -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        graph.add_node(
            GraphNode::new("source.shop.raw.orders", "orders", ResourceType::Source)
                .with_source_name("raw")
                .with_tags(["nightly"]),
        );
        graph.add_node(GraphNode::new("model.shop.stg_orders", "stg_orders", ResourceType::Model).with_tags(["nightly"]));
        graph.add_node(GraphNode::new("model.shop.orders", "orders", ResourceType::Model));
        graph.add_node(GraphNode::new("seed.shop.lookup", "lookup", ResourceType::Seed));
        graph.add_edge("source.shop.raw.orders", "model.shop.stg_orders");
        graph.add_edge("model.shop.stg_orders", "model.shop.orders");
        graph.add_edge("seed.shop.lookup", "model.shop.orders");
        graph
    }

    fn ids(set: &BTreeSet<NodeId>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn at_operator_pulls_in_other_parents() {
        let graph = graph();
        let selector = NodeSelector::new(&graph);
        let expr = parse("@source:raw").unwrap();
        assert_eq!(
            ids(&selector.evaluate(&expr)),
            vec![
                "model.shop.orders",
                "model.shop.stg_orders",
                "seed.shop.lookup",
                "source.shop.raw.orders",
            ]
        );
    }

    #[test]
    fn intersection_of_terms() {
        let graph = graph();
        let selector = NodeSelector::new(&graph);
        let expr = parse("tag:nightly,resource_type:model").unwrap();
        assert_eq!(ids(&selector.evaluate(&expr)), vec!["model.shop.stg_orders"]);
    }

    #[test]
    fn purpose_filters() {
        let graph = graph();
        let selector = NodeSelector::new(&graph);

        let all_sources = selector.select(None, None, SelectionPurpose::Freshness);
        assert_eq!(ids(&all_sources), vec!["source.shop.raw.orders"]);

        let source_only = parse("source:raw").unwrap();
        assert!(selector
            .select(Some(&source_only), None, SelectionPurpose::Execution)
            .is_empty());
    }

    #[test]
    fn exclude_is_expanded_before_subtraction() {
        let graph = graph();
        let selector = NodeSelector::new(&graph);
        let include = parse("+orders").unwrap();
        let exclude = parse("stg_orders+").unwrap();
        let selected = selector.select(Some(&include), Some(&exclude), SelectionPurpose::Execution);
        assert_eq!(ids(&selected), vec!["seed.shop.lookup"]);
    }
}
