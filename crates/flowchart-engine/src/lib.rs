//! Flowchart Engine - integrity checks for AI-generated decision flowcharts
//!
//! A flowchart produced by a model arrives as loosely shaped JSON: ids may be
//! missing or duplicated and edges may point anywhere. This crate turns it
//! into a graph that is safe to persist or render:
//!
//! - `schema`: shape checks on the raw JSON (fatal, raised before validation)
//! - `normalize`: deterministic id assignment with an explicit `IdAllocator`
//! - `validation`: structural rules (orphans, self-loops) returned as data
//! - `pipeline`: the handoff from assembled protocol content to a validated graph
//!
//! # Example
//!
//! ```
//! use flowchart_engine::{normalize_value, validate_flowchart};
//!
//! let raw = serde_json::json!({
//!     "nodes": [
//!         { "type": "start", "data": { "title": "Start" } },
//!         { "type": "end", "data": { "title": "End" } }
//!     ],
//!     "edges": [ { "source": "node-0", "target": "node-1" } ]
//! });
//! let graph = normalize_value(&raw).unwrap();
//! assert_eq!(graph.nodes[0].id, "node-0");
//! assert!(validate_flowchart(&graph).is_empty());
//! ```

pub mod builder;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::FlowchartBuilder;
pub use error::{FlowchartError, Result};
pub use normalize::{normalize_flowchart, normalize_value, normalize_with, IdAllocator};
pub use pipeline::{FlowchartModel, FlowchartPipeline, FlowchartRequest, GeneratedFlowchart};
pub use schema::{RawEdge, RawFlowchart, RawNode};
pub use types::{EdgeKind, FlowchartEdge, FlowchartGraph, FlowchartNode, NodeData, NodeKind, Position};
pub use validation::{validate_flowchart, validate_with_report, FlowchartRule, FLOWCHART_RULES};
