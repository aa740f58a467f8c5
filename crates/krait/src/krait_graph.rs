//! Directed import graph over internal modules and third-party leaves.
//!
//! Nodes are modules; an edge importer → imported aggregates every import
//! site between the pair, with required and optional provenance kept
//! disjoint. No edge ever targets a standard-library module (those are
//! dropped before recording), and self-loops are forbidden. Cycles across
//! modules are allowed; traversals prune revisited nodes.

use indexmap::IndexMap;
use log::debug;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::path::PathBuf;

use crate::extractor::ImportSite;
use crate::module_name::ModuleName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of the node's name equals the tracked root package
    Internal,
    /// A third-party leaf (or scanned third-party module at full depth)
    ThirdParty,
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub name: ModuleName,
    pub path: Option<PathBuf>,
    pub is_package: bool,
    pub kind: NodeKind,
}

/// Aggregated metadata for all imports between one importer/imported pair.
///
/// An edge is optional only when every site that produced it sits inside a
/// guarded region; a single unguarded import makes the edge required.
#[derive(Debug, Clone, Default)]
pub struct EdgeData {
    pub required_sites: Vec<ImportSite>,
    pub optional_sites: Vec<ImportSite>,
}

impl EdgeData {
    pub fn is_optional(&self) -> bool {
        self.required_sites.is_empty()
    }

    /// Sites in recording order, required first.
    pub fn sites(&self) -> impl Iterator<Item = (&ImportSite, bool)> {
        self.required_sites
            .iter()
            .map(|site| (site, false))
            .chain(self.optional_sites.iter().map(|site| (site, true)))
    }

    pub fn first_site(&self) -> Option<&ImportSite> {
        self.required_sites
            .first()
            .or_else(|| self.optional_sites.first())
    }

    fn record(&mut self, site: ImportSite, optional: bool) {
        if optional {
            self.optional_sites.push(site);
        } else {
            self.required_sites.push(site);
        }
    }
}

/// The dependency graph: modules plus aggregated import edges.
#[derive(Debug, Default)]
pub struct DepGraph {
    graph: DiGraph<ModuleNode, EdgeData>,
    node_indices: IndexMap<String, NodeIndex>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph, updating the payload if the name is already
    /// present (a leaf recorded from an edge may later be loaded properly).
    pub fn add_module(&mut self, module: ModuleNode) -> NodeIndex {
        let module_name = module.name.as_str().to_owned();
        if let Some(&existing_index) = self.node_indices.get(&module_name) {
            let existing = &mut self.graph[existing_index];
            if existing.path.is_none() {
                *existing = module;
            }
            return existing_index;
        }
        let index = self.graph.add_node(module);
        self.node_indices.insert(module_name, index);
        index
    }

    /// Record one import site between two modules already in the graph.
    pub fn add_import(&mut self, from: &str, to: &str, optional: bool, site: ImportSite) {
        debug_assert_ne!(from, to, "self-loops are forbidden");
        if from == to {
            return;
        }
        let (Some(&from_index), Some(&to_index)) =
            (self.node_indices.get(from), self.node_indices.get(to))
        else {
            debug!("Dropping import edge between unknown modules {from} -> {to}");
            return;
        };

        let edge_index = self
            .graph
            .find_edge(from_index, to_index)
            .unwrap_or_else(|| self.graph.add_edge(from_index, to_index, EdgeData::default()));
        self.graph[edge_index].record(site, optional);
    }

    pub fn contains(&self, module_name: &str) -> bool {
        self.node_indices.contains_key(module_name)
    }

    pub fn node(&self, module_name: &str) -> Option<&ModuleNode> {
        self.node_indices
            .get(module_name)
            .map(|&index| &self.graph[index])
    }

    /// Outgoing edges of a module as `(imported node, edge data)` pairs.
    pub fn edges_from(&self, module_name: &str) -> Vec<(&ModuleNode, &EdgeData)> {
        let Some(&index) = self.node_indices.get(module_name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (&self.graph[edge.target()], edge.weight()))
            .collect()
    }

    /// Direct third-party targets of a module with their edge data.
    pub fn third_party_edges_from(&self, module_name: &str) -> Vec<(&ModuleNode, &EdgeData)> {
        self.edges_from(module_name)
            .into_iter()
            .filter(|(node, _)| node.kind == NodeKind::ThirdParty)
            .collect()
    }

    /// Internal modules, in discovery order.
    pub fn internal_modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.graph
            .node_weights()
            .filter(|node| node.kind == NodeKind::Internal)
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(lineno: usize) -> ImportSite {
        ImportSite {
            filename: "mod.py".to_owned(),
            lineno,
            code_context: "import alog".to_owned(),
        }
    }

    fn internal(name: &str) -> ModuleNode {
        ModuleNode {
            name: ModuleName::new(name).unwrap(),
            path: Some(PathBuf::from(format!("{name}.py"))),
            is_package: false,
            kind: NodeKind::Internal,
        }
    }

    fn third_party(name: &str) -> ModuleNode {
        ModuleNode {
            name: ModuleName::new(name).unwrap(),
            path: None,
            is_package: false,
            kind: NodeKind::ThirdParty,
        }
    }

    #[test]
    fn test_edge_aggregation_keeps_sites_disjoint() {
        let mut graph = DepGraph::new();
        graph.add_module(internal("pkg.mod"));
        graph.add_module(third_party("alog"));

        graph.add_import("pkg.mod", "alog", true, site(2));
        graph.add_import("pkg.mod", "alog", false, site(7));

        let edges = graph.third_party_edges_from("pkg.mod");
        assert_eq!(edges.len(), 1);
        let (node, data) = &edges[0];
        assert_eq!(node.name.as_str(), "alog");
        // One unguarded site makes the aggregate edge required
        assert!(!data.is_optional());
        assert_eq!(data.optional_sites.len(), 1);
        assert_eq!(data.required_sites.len(), 1);
        assert_eq!(data.sites().count(), 2);
    }

    #[test]
    fn test_optional_only_edge() {
        let mut graph = DepGraph::new();
        graph.add_module(internal("pkg.mod"));
        graph.add_module(third_party("alog"));
        graph.add_import("pkg.mod", "alog", true, site(3));

        let edges = graph.third_party_edges_from("pkg.mod");
        assert!(edges[0].1.is_optional());
    }

    #[test]
    fn test_leaf_upgrade_keeps_index() {
        let mut graph = DepGraph::new();
        let leaf_index = graph.add_module(third_party("pkg.sub"));
        let loaded_index = graph.add_module(internal("pkg.sub"));
        assert_eq!(leaf_index, loaded_index);
        assert_eq!(graph.node("pkg.sub").unwrap().kind, NodeKind::Internal);
        assert_eq!(graph.module_count(), 1);
    }

    #[test]
    fn test_cycles_are_representable() {
        let mut graph = DepGraph::new();
        graph.add_module(internal("pkg.a"));
        graph.add_module(internal("pkg.b"));
        graph.add_import("pkg.a", "pkg.b", false, site(1));
        graph.add_import("pkg.b", "pkg.a", false, site(1));
        assert!(graph.has_cycles());
    }
}
