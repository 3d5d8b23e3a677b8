/// Topological ordering of workflow nodes
///
/// Builds a petgraph `DiGraph` from the node and edge lists and runs Kahn's
/// algorithm over it. Ready nodes are released in original list order, so a
/// fixed graph always yields the same order. Nodes that never become ready
/// (on or behind a cycle) are reported in `excluded` instead of failing.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

use crate::workflow::types::{Edge, Node};

/// Result of sorting one workflow graph.
#[derive(Debug)]
pub struct SortedNodes<'a> {
    /// Nodes in dependency order
    pub ordered: Vec<&'a Node>,
    /// Ids of nodes left out because they sit on or behind a cycle
    pub excluded: Vec<String>,
}

/// Order `nodes` so that every edge's source precedes its target.
///
/// Edges naming unknown nodes are ignored.
pub fn sort<'a>(nodes: &'a [Node], edges: &[Edge]) -> SortedNodes<'a> {
    let mut graph: DiGraph<&'a Node, ()> = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

    for node in nodes {
        let index = graph.add_node(node);
        index_of.entry(node.id.as_str()).or_insert(index);
    }

    for edge in edges {
        match (index_of.get(edge.source.as_str()), index_of.get(edge.target.as_str())) {
            (Some(&from), Some(&to)) => {
                graph.add_edge(from, to, ());
            }
            _ => tracing::debug!("🔗 Ignoring edge '{}' → '{}' with unknown endpoint", edge.source, edge.target),
        }
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.edges_directed(idx, Direction::Incoming).count())
        .collect();

    // Node indices follow input order, so ascending index is the tie-break
    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        ordered.push(graph[current]);

        let mut released = Vec::new();
        for target in graph.neighbors_directed(current, Direction::Outgoing) {
            let degree = &mut in_degree[target.index()];
            *degree -= 1;
            if *degree == 0 {
                released.push(target);
            }
        }
        released.sort();
        queue.extend(released);
    }

    let excluded = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] > 0)
        .map(|idx| graph[idx].id.clone())
        .collect();

    SortedNodes { ordered, excluded }
}
