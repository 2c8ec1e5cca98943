//! Shape checks for raw model output
//!
//! Raw flowcharts may omit ids entirely. Everything else about the shape is
//! enforced here: a violation is a contract error raised before any
//! structural validation runs.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{FlowchartError, Result};
use crate::types::{EdgeKind, FlowchartEdge, FlowchartGraph, FlowchartNode, NodeData, NodeKind, Position};

/// A node as produced by the model, id optional
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: Option<String>,
    pub kind: NodeKind,
    pub data: NodeData,
    pub position: Option<Position>,
}

/// An edge as produced by the model, id optional
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    pub label: Option<String>,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    pub kind: Option<EdgeKind>,
}

/// A flowchart that passed shape checks but has not been normalized
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawFlowchart {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeShape {
    #[serde(default)]
    id: Value,
    #[serde(rename = "type")]
    kind: NodeKind,
    data: NodeData,
    #[serde(default)]
    position: Option<Position>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeShape {
    #[serde(default)]
    id: Value,
    source: String,
    target: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    source_handle: Option<String>,
    #[serde(default)]
    target_handle: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<EdgeKind>,
}

/// Only non-blank strings count as ids
fn explicit_id(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Fetch a list-valued field; a missing field is an empty list
fn list_field<'a>(root: &'a serde_json::Map<String, Value>, field: &str) -> Result<&'a [Value]> {
    match root.get(field) {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(FlowchartError::schema(format!(
            "'{}' must be a list, found {}",
            field,
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

impl RawFlowchart {
    /// Parse model content (a JSON document) into a raw flowchart
    ///
    /// Non-JSON content is a `MalformedJson` error, distinct from shape
    /// violations.
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| FlowchartError::MalformedJson(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Check the shape of an already-parsed JSON value
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| FlowchartError::schema(format!("expected an object, found {}", json_kind(value))))?;

        let nodes = list_field(root, "nodes")?
            .iter()
            .enumerate()
            .map(|(index, item)| parse_node(index, item))
            .collect::<Result<Vec<_>>>()?;

        let edges = list_field(root, "edges")?
            .iter()
            .enumerate()
            .map(|(index, item)| parse_edge(index, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { nodes, edges })
    }
}

fn parse_node(index: usize, item: &Value) -> Result<RawNode> {
    let shape: NodeShape = serde_json::from_value(item.clone())
        .map_err(|e| FlowchartError::schema(format!("node {}: {}", index, e)))?;

    if shape.data.title.trim().is_empty() {
        return Err(FlowchartError::schema(format!("node {}: title is required", index)));
    }

    Ok(RawNode {
        id: explicit_id(shape.id),
        kind: shape.kind,
        data: shape.data,
        position: shape.position,
    })
}

fn parse_edge(index: usize, item: &Value) -> Result<RawEdge> {
    let shape: EdgeShape = serde_json::from_value(item.clone())
        .map_err(|e| FlowchartError::schema(format!("edge {}: {}", index, e)))?;

    if shape.source.trim().is_empty() {
        return Err(FlowchartError::schema(format!("edge {}: source is required", index)));
    }
    if shape.target.trim().is_empty() {
        return Err(FlowchartError::schema(format!("edge {}: target is required", index)));
    }

    Ok(RawEdge {
        id: explicit_id(shape.id),
        source: shape.source,
        target: shape.target,
        label: shape.label,
        source_handle: shape.source_handle,
        target_handle: shape.target_handle,
        kind: shape.kind,
    })
}

impl From<FlowchartNode> for RawNode {
    fn from(node: FlowchartNode) -> Self {
        Self {
            id: Some(node.id),
            kind: node.kind,
            data: node.data,
            position: node.position,
        }
    }
}

impl From<FlowchartEdge> for RawEdge {
    fn from(edge: FlowchartEdge) -> Self {
        Self {
            id: Some(edge.id),
            source: edge.source,
            target: edge.target,
            label: edge.label,
            source_handle: edge.source_handle,
            target_handle: edge.target_handle,
            kind: edge.kind,
        }
    }
}

impl From<FlowchartGraph> for RawFlowchart {
    fn from(graph: FlowchartGraph) -> Self {
        Self {
            nodes: graph.nodes.into_iter().map(RawNode::from).collect(),
            edges: graph.edges.into_iter().map(RawEdge::from).collect(),
        }
    }
}
