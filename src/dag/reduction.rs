// src/dag/reduction.rs

//! Transitive reduction driven by plain-edge reachability.

use fixedbitset::FixedBitSet;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, NodeIndexable};

use crate::errors::{ExpflowError, Result};
use crate::job::{EdgeInfo, JobName};

/// Edges `u -> v` for which another path of plain edges leads from `u` to
/// `v`.
///
/// Descendant sets are computed bottom-up in reverse topological order
/// over plain edges only; an edge is redundant when its target is a strict
/// descendant of one of the source's plain children. Special edges can be
/// dropped this way too, but never count as alternate paths.
pub(crate) fn redundant_edges(graph: &StableDiGraph<JobName, EdgeInfo>) -> Result<Vec<EdgeIndex>> {
    let order = toposort(graph, None)
        .map_err(|cycle| ExpflowError::DagCycle(graph[cycle.node_id()].clone()))?;

    let n = order.len();
    let mut position = vec![usize::MAX; graph.node_bound()];
    for (pos, node) in order.iter().enumerate() {
        position[node.index()] = pos;
    }

    let children = |node: NodeIndex, special: bool| {
        graph
            .edges_directed(node, Direction::Outgoing)
            .filter(|e| e.weight().is_special() == special)
            .map(|e| (e.id(), e.target()))
            .collect::<Vec<_>>()
    };

    // descendants[pos] holds topological positions reachable from the node
    // at `pos` through at least one plain edge.
    let mut descendants: Vec<FixedBitSet> = vec![FixedBitSet::with_capacity(n); n];
    for (pos, node) in order.iter().enumerate().rev() {
        let mut reach = FixedBitSet::with_capacity(n);
        for (_, child) in children(*node, false) {
            let child_pos = position[child.index()];
            reach.insert(child_pos);
            reach.union_with(&descendants[child_pos]);
        }
        descendants[pos] = reach;
    }

    let mut redundant = Vec::new();
    for node in order.iter() {
        let plain = children(*node, false);
        if plain.is_empty() {
            continue;
        }
        let mut via_plain = FixedBitSet::with_capacity(n);
        for (_, child) in plain.iter() {
            via_plain.union_with(&descendants[position[child.index()]]);
        }
        for (edge, child) in plain.into_iter().chain(children(*node, true)) {
            if via_plain.contains(position[child.index()]) {
                redundant.push(edge);
            }
        }
    }

    Ok(redundant)
}
