use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Node in the reference graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceNode {
    /// A chunk, by id
    Chunk(String),

    /// A label that resolved to nothing
    Dangling(String),
}

/// Edge: `source` cites `label`, which resolved to the target node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub label: String,

    /// Depth of the source chunk (the focus chunk is 0)
    pub depth: usize,
}

/// Directed graph of discovered references, possibly cyclic
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    pub graph: DiGraph<ReferenceNode, ReferenceEdge>,
    node_index: HashMap<ReferenceNode, NodeIndex>,
}

impl ReferenceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, node: ReferenceNode) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_index.insert(node, idx);
        idx
    }

    pub fn add_chunk(&mut self, chunk_id: &str) -> NodeIndex {
        self.node(ReferenceNode::Chunk(chunk_id.to_string()))
    }

    /// Record that `from` cites `label`, resolved to chunk `to`
    pub fn add_reference(&mut self, from: &str, to: &str, label: &str, depth: usize) {
        let from = self.add_chunk(from);
        let to = self.add_chunk(to);
        self.add_edge(from, to, label, depth);
    }

    /// Record that `from` cites `label`, which matched no chunk
    pub fn add_dangling(&mut self, from: &str, label: &str, depth: usize) {
        let from = self.add_chunk(from);
        let to = self.node(ReferenceNode::Dangling(label.to_string()));
        self.add_edge(from, to, label, depth);
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, label: &str, depth: usize) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|edge| edge.weight().label == label);
        if !exists {
            self.graph.add_edge(
                from,
                to,
                ReferenceEdge {
                    label: label.to_string(),
                    depth,
                },
            );
        }
    }

    /// Chunk ids cited by `chunk_id`
    #[must_use]
    pub fn cited_by(&self, chunk_id: &str) -> Vec<&str> {
        self.neighbors(chunk_id, Direction::Outgoing)
    }

    /// Chunk ids that cite `chunk_id`
    #[must_use]
    pub fn citing(&self, chunk_id: &str) -> Vec<&str> {
        self.neighbors(chunk_id, Direction::Incoming)
    }

    fn neighbors(&self, chunk_id: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self
            .node_index
            .get(&ReferenceNode::Chunk(chunk_id.to_string()))
        else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .edges_directed(idx, direction)
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                match self.graph.node_weight(other) {
                    Some(ReferenceNode::Chunk(id)) => Some(id.as_str()),
                    _ => None,
                }
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// True when the discovered references form a cycle (A → B → A)
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
