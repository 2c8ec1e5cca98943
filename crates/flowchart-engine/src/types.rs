//! Core types for protocol flowcharts
//!
//! These types describe a normalized flowchart: every node and edge carries
//! a non-empty id. Raw model output lives in `schema` until normalized.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// The kind of a flowchart node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point of the protocol flow
    Start,
    /// Terminal outcome (discharge, referral, ...)
    End,
    /// Yes/no or multi-way clinical decision
    Decision,
    /// List of actions to perform
    Action,
    /// Medication table
    Medication,
    /// Triage / initial assessment
    Triage,
}

impl NodeKind {
    /// Start and end nodes are exempt from the orphan rule
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Start | NodeKind::End)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Decision => "decision",
            NodeKind::Action => "action",
            NodeKind::Medication => "medication",
            NodeKind::Triage => "triage",
        }
    }
}

/// Edge rendering style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Default,
    Conditional,
}

/// Position on the canvas
///
/// Layout is applied elsewhere; generated nodes start at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };
}

/// A medication row on a medication node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartMedication {
    pub name: String,
    pub dose: String,
    pub route: String,
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A labelled output handle on a decision node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutput {
    pub id: String,
    pub label: String,
    pub position: String,
}

/// Node payload
///
/// Only `title` is required. Unknown fields are carried through untouched so
/// nothing the model produced is silently dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub title: String,
    /// Mirrors the node's kind once post-processed
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medications: Option<Vec<FlowchartMedication>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<DecisionOutput>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NodeData {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A node in a normalized flowchart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// An edge in a normalized flowchart
///
/// `source`/`target` are not guaranteed to resolve to nodes in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EdgeKind>,
}

impl FlowchartEdge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// A normalized flowchart
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowchartGraph {
    pub nodes: Vec<FlowchartNode>,
    pub edges: Vec<FlowchartEdge>,
}

impl FlowchartGraph {
    /// Create an empty graph
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&FlowchartNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a FlowchartEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a FlowchartEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Node ids in order
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Edge ids in order
    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|e| e.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_wire_shape() {
        let node: FlowchartNode = serde_json::from_value(json!({
            "id": "n1",
            "type": "medication",
            "data": {
                "title": "Antibiotics",
                "medications": [
                    { "name": "Amoxicillin", "dose": "500mg", "route": "oral", "frequency": "8/8h" }
                ],
                "color": "red"
            }
        }))
        .unwrap();

        assert_eq!(node.kind, NodeKind::Medication);
        assert_eq!(node.data.medications.as_ref().map(Vec::len), Some(1));
        assert_eq!(node.data.extra.get("color"), Some(&json!("red")));
        assert!(node.position.is_none());

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "medication");
        assert_eq!(back["data"]["color"], "red");
    }

    #[test]
    fn test_graph_edges() {
        let graph = FlowchartGraph {
            nodes: vec![
                FlowchartNode {
                    id: "a".to_string(),
                    kind: NodeKind::Start,
                    data: NodeData::titled("A"),
                    position: None,
                },
                FlowchartNode {
                    id: "b".to_string(),
                    kind: NodeKind::End,
                    data: NodeData::titled("B"),
                    position: None,
                },
            ],
            edges: vec![FlowchartEdge {
                id: "e".to_string(),
                source: "a".to_string(),
                target: "b".to_string(),
                label: None,
                source_handle: None,
                target_handle: None,
                kind: None,
            }],
        };

        assert_eq!(graph.outgoing_edges("a").count(), 1);
        assert_eq!(graph.incoming_edges("b").count(), 1);
        assert_eq!(graph.incoming_edges("a").count(), 0);
        assert!(graph.find_node("b").is_some());
        assert!(!graph.edges[0].is_self_loop());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(NodeKind::Start.is_terminal());
        assert!(NodeKind::End.is_terminal());
        assert!(!NodeKind::Triage.is_terminal());
    }
}
