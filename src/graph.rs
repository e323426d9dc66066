//! The intersection interaction graph.
//!
//! Nodes are controlled intersections; a directed edge records that traffic
//! leaving one controlled intersection can reach another one downstream. The
//! petgraph representation is canonical; dense index arrays for learning
//! backends are derived at the boundary via [`NetworkGraph::edge_index`].

use std::collections::HashMap;

use log::info;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::sumo::{SumoError, SumoInterface};
use crate::Id;

/// Directed graph over controlled intersections.
///
/// Built once per session from controller-to-controller reachability and
/// rebuilt whole on topology reload, never patched incrementally. Identical
/// topology input yields an identical node-index map and edge list.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    graph: DiGraph<Id, ()>,
    node_by_id: HashMap<Id, NodeIndex>,
}

impl NetworkGraph {
    /// Builds the graph for the given traffic lights, in discovery order.
    ///
    /// For every lane a controller controls, outgoing links are followed to
    /// the downstream edge; an edge is added only when that edge's
    /// destination junction is itself a controlled intersection.
    pub fn build(sumo: &dyn SumoInterface, tls_ids: &[Id]) -> Result<Self, SumoError> {
        let mut graph = DiGraph::new();
        let mut node_by_id = HashMap::with_capacity(tls_ids.len());
        for tls_id in tls_ids {
            let node = graph.add_node(tls_id.clone());
            node_by_id.insert(tls_id.clone(), node);
        }

        for tls_id in tls_ids {
            let src = node_by_id[tls_id];
            for lane in sumo.controlled_lanes(tls_id)? {
                for outgoing in sumo.lane_links(&lane)? {
                    let edge = sumo.edge_of_lane(&outgoing)?;
                    let junction = sumo.edge_to_junction(&edge)?;
                    if let Some(&dest) = node_by_id.get(&junction) {
                        graph.add_edge(src, dest, ());
                    }
                }
            }
        }

        info!(
            "built intersection graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self { graph, node_by_id })
    }

    /// The canonical petgraph representation.
    pub fn graph(&self) -> &DiGraph<Id, ()> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Integer index of a controller id, if present.
    pub fn node_index(&self, tls_id: &str) -> Option<usize> {
        self.node_by_id.get(tls_id).map(|n| n.index())
    }

    /// Controller id of an integer index, if present.
    pub fn id_of(&self, index: usize) -> Option<&str> {
        self.graph
            .node_weight(NodeIndex::new(index))
            .map(String::as_str)
    }

    /// Edge list as `(source index, target index)` pairs, in insertion order.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (a.index(), b.index()))
            .collect()
    }

    /// Dense `[sources, targets]` arrays for learning backends.
    pub fn edge_index(&self) -> [Vec<usize>; 2] {
        let edges = self.edges();
        [
            edges.iter().map(|(s, _)| *s).collect(),
            edges.iter().map(|(_, t)| *t).collect(),
        ]
    }
}
