//! Fluent builder for flowcharts
//!
//! Provides a fluent API for constructing normalized graphs in code.

use crate::types::{FlowchartEdge, FlowchartGraph, FlowchartNode, NodeData, NodeKind, Position};

/// Fluent builder for constructing flowcharts
///
/// # Example
///
/// ```
/// use flowchart_engine::{FlowchartBuilder, NodeKind};
///
/// let graph = FlowchartBuilder::new()
///     .add_node("start", NodeKind::Start, "Patient arrives")
///     .add_node("fever", NodeKind::Decision, "Fever?")
///     .with_criteria("Temperature >= 38C")
///     .add_edge("start", "fever")
///     .build();
/// assert_eq!(graph.edges[0].id, "edge-1");
/// ```
#[derive(Default)]
pub struct FlowchartBuilder {
    nodes: Vec<FlowchartNode>,
    edges: Vec<FlowchartEdge>,
    edge_counter: usize,
}

impl FlowchartBuilder {
    /// Create a new flowchart builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(mut self, id: impl Into<String>, kind: NodeKind, title: impl Into<String>) -> Self {
        self.nodes.push(FlowchartNode {
            id: id.into(),
            kind,
            data: NodeData::titled(title),
            position: None,
        });
        self
    }

    /// Set decision criteria on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data.criteria = Some(criteria.into());
        }
        self
    }

    /// Set the position of the most recently added node
    pub fn at(mut self, x: f64, y: f64) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.position = Some(Position { x, y });
        }
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn add_edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edge_counter += 1;
        let id = format!("edge-{}", self.edge_counter);
        self.add_edge_with_id(id, source, target)
    }

    /// Add an edge with an explicit ID
    pub fn add_edge_with_id(
        mut self,
        edge_id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edges.push(FlowchartEdge {
            id: edge_id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            source_handle: None,
            target_handle: None,
            kind: None,
        });
        self
    }

    /// Set label and source handle on the most recently added edge
    pub fn labelled(mut self, label: impl Into<String>, source_handle: impl Into<String>) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.label = Some(label.into());
            edge.source_handle = Some(source_handle.into());
        }
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> FlowchartGraph {
        FlowchartGraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}
