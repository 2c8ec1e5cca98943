//! Id normalization
//!
//! Every node and edge leaves normalization with a non-empty id. Missing ids
//! are drawn from an `IdAllocator` owned by the caller, so concurrent
//! normalizations never share counter state.
//!
//! Rules, applied in encounter order:
//! - an explicit id is kept verbatim unless an earlier element already used
//!   the same explicit id, in which case it is replaced by a generated one
//! - a missing id becomes `node-<n>` / `edge-<n>`, with independent counters
//!   starting at 0
//! - generated ids are not checked against explicit ids, so an explicit
//!   `node-0` can collide with a generated `node-0`

use std::collections::HashSet;

use serde_json::Value;

use crate::error::Result;
use crate::schema::RawFlowchart;
use crate::types::{FlowchartEdge, FlowchartGraph, FlowchartNode};

/// Counter state for generated ids, scoped to one normalization
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_node: usize,
    next_edge: usize,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next node id
    pub fn next_node_id(&mut self) -> String {
        let id = format!("node-{}", self.next_node);
        self.next_node += 1;
        id
    }

    /// Allocate the next edge id
    pub fn next_edge_id(&mut self) -> String {
        let id = format!("edge-{}", self.next_edge);
        self.next_edge += 1;
        id
    }

    /// Number of node ids handed out so far
    pub fn nodes_assigned(&self) -> usize {
        self.next_node
    }

    /// Number of edge ids handed out so far
    pub fn edges_assigned(&self) -> usize {
        self.next_edge
    }
}

/// Tracks explicit ids already used within one element list
struct ExplicitIds(HashSet<String>);

impl ExplicitIds {
    fn new() -> Self {
        Self(HashSet::new())
    }

    /// Keep `candidate` if it is fresh, otherwise fall back to `generate`
    fn resolve(&mut self, candidate: Option<String>, kind: &str, generate: impl FnOnce() -> String) -> String {
        match candidate {
            Some(id) if self.0.insert(id.clone()) => id,
            Some(id) => {
                let fresh = generate();
                log::debug!("Duplicate {} id '{}' replaced with '{}'", kind, id, fresh);
                fresh
            }
            None => generate(),
        }
    }
}

/// Normalize a raw flowchart with a fresh allocator
pub fn normalize_flowchart(raw: RawFlowchart) -> FlowchartGraph {
    let mut ids = IdAllocator::new();
    normalize_with(raw, &mut ids)
}

/// Normalize a raw flowchart, drawing generated ids from `ids`
pub fn normalize_with(raw: RawFlowchart, ids: &mut IdAllocator) -> FlowchartGraph {
    let mut seen_nodes = ExplicitIds::new();
    let nodes: Vec<FlowchartNode> = raw
        .nodes
        .into_iter()
        .map(|node| FlowchartNode {
            id: seen_nodes.resolve(node.id, "node", || ids.next_node_id()),
            kind: node.kind,
            data: node.data,
            position: node.position,
        })
        .collect();

    let mut seen_edges = ExplicitIds::new();
    let edges: Vec<FlowchartEdge> = raw
        .edges
        .into_iter()
        .map(|edge| FlowchartEdge {
            id: seen_edges.resolve(edge.id, "edge", || ids.next_edge_id()),
            source: edge.source,
            target: edge.target,
            label: edge.label,
            source_handle: edge.source_handle,
            target_handle: edge.target_handle,
            kind: edge.kind,
        })
        .collect();

    log::debug!(
        "Normalized flowchart: {} nodes ({} generated ids), {} edges ({} generated ids)",
        nodes.len(),
        ids.nodes_assigned(),
        edges.len(),
        ids.edges_assigned()
    );

    FlowchartGraph { nodes, edges }
}

/// Shape-check and normalize a JSON value in one step
///
/// Shape violations are raised here, before any validation can run.
pub fn normalize_value(value: &Value) -> Result<FlowchartGraph> {
    let raw = RawFlowchart::from_value(value)?;
    Ok(normalize_flowchart(raw))
}
