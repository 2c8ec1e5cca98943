//! Flowchart generation handoff
//!
//! Once protocol content is complete, the caller hands it to this pipeline:
//! the relevant sections go to a flowchart model, and the model's raw output
//! is parsed, normalized, post-processed and validated before anything is
//! persisted or rendered. The generation orchestrator never calls this
//! directly; callers compose the two.

use std::sync::Arc;

use async_trait::async_trait;
use protocol_contracts::{ProtocolContent, SectionContent, ValidationReport};
use serde::Serialize;

use crate::error::{FlowchartError, Result};
use crate::normalize::normalize_flowchart;
use crate::schema::RawFlowchart;
use crate::types::{FlowchartGraph, NodeKind, Position};
use crate::validation::validate_with_report;

/// Sections that drive the decision flow: criteria, assessment, diagnosis,
/// treatment, complications, admission/discharge
pub const RELEVANT_SECTIONS: [u8; 6] = [4, 5, 6, 7, 8, 9];

/// Source handle given to decision edges that arrive without one
pub const DEFAULT_DECISION_HANDLE: &str = "yes";

/// Input handed to a flowchart model
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartRequest {
    pub protocol_id: String,
    /// Medical condition the protocol covers
    pub condition: String,
    /// Relevant, non-blank sections in document order
    pub sections: Vec<SectionContent>,
}

/// A model that turns protocol sections into a candidate flowchart
///
/// Implementations return the model's raw text; it is expected to be a JSON
/// document with `nodes` and `edges` but is not trusted to be.
#[async_trait]
pub trait FlowchartModel: Send + Sync {
    async fn generate(&self, request: &FlowchartRequest) -> Result<String>;
}

#[async_trait]
impl<T: FlowchartModel + ?Sized> FlowchartModel for Arc<T> {
    async fn generate(&self, request: &FlowchartRequest) -> Result<String> {
        (**self).generate(request).await
    }
}

/// A normalized flowchart together with its validation report
#[derive(Debug, Clone)]
pub struct GeneratedFlowchart {
    pub graph: FlowchartGraph,
    pub report: ValidationReport,
}

impl GeneratedFlowchart {
    fn empty() -> Self {
        Self {
            graph: FlowchartGraph::empty(),
            report: ValidationReport::from_issues(Vec::new()),
        }
    }

    /// True when only warnings (or nothing) were found
    pub fn accepts_silently(&self) -> bool {
        self.report.accepts_silently()
    }
}

/// Generates validated flowcharts from protocol content
pub struct FlowchartPipeline<M: FlowchartModel> {
    model: M,
}

impl<M: FlowchartModel> FlowchartPipeline<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Generate a flowchart for a protocol
    ///
    /// Content without any relevant section yields an empty flowchart and
    /// never reaches the model.
    pub async fn generate(
        &self,
        protocol_id: &str,
        content: &ProtocolContent,
        condition: &str,
    ) -> Result<GeneratedFlowchart> {
        let sections: Vec<SectionContent> = content
            .select(&RELEVANT_SECTIONS)
            .into_iter()
            .cloned()
            .collect();

        if sections.is_empty() {
            log::warn!(
                "No relevant sections found in protocol {} for flowchart generation, returning empty flowchart",
                protocol_id
            );
            return Ok(GeneratedFlowchart::empty());
        }

        let request = FlowchartRequest {
            protocol_id: protocol_id.to_string(),
            condition: condition.to_string(),
            sections,
        };

        log::info!(
            "Generating flowchart for protocol {} from {} sections",
            protocol_id,
            request.sections.len()
        );

        let output = self.model.generate(&request).await.map_err(|e| {
            log::error!("Flowchart model call failed for protocol {}: {}", protocol_id, e);
            e
        })?;

        process_model_output(&output)
    }
}

/// Turn raw model output into a validated flowchart
///
/// Order matters: shape checks and normalization run first and are fatal;
/// validation only ever produces issues.
pub fn process_model_output(output: &str) -> Result<GeneratedFlowchart> {
    if output.trim().is_empty() {
        return Err(FlowchartError::EmptyResponse);
    }

    let raw = RawFlowchart::parse(output)?;
    let mut graph = normalize_flowchart(raw);
    prepare_for_layout(&mut graph);

    let report = validate_with_report(&graph);
    if !report.is_valid {
        log::warn!(
            "Generated flowchart has {} blocking issue(s), needs review",
            report.summary.errors
        );
    }

    Ok(GeneratedFlowchart { graph, report })
}

/// Reset positions, mirror node kinds into data, default decision handles
fn prepare_for_layout(graph: &mut FlowchartGraph) {
    for node in &mut graph.nodes {
        node.position = Some(Position::ORIGIN);
        node.data.kind = Some(node.kind);
    }

    let decision_ids: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Decision)
        .map(|n| n.id.clone())
        .collect();

    for edge in &mut graph.edges {
        if edge.source_handle.is_none() && decision_ids.contains(&edge.source) {
            log::warn!(
                "Edge {} from decision node {} is missing sourceHandle, defaulting to '{}'",
                edge.id,
                edge.source,
                DEFAULT_DECISION_HANDLE
            );
            edge.source_handle = Some(DEFAULT_DECISION_HANDLE.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::SELF_LOOP_RULE;
    use protocol_contracts::SectionNumber;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Model double returning a canned response and counting calls
    struct ScriptedModel {
        response: Result<String>,
        calls: AtomicUsize,
        last_request: Mutex<Option<FlowchartRequest>>,
    }

    impl ScriptedModel {
        fn returning(response: impl Into<String>) -> Self {
            Self {
                response: Ok(response.into()),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(FlowchartError::model(message)),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl FlowchartModel for ScriptedModel {
        async fn generate(&self, request: &FlowchartRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(FlowchartError::model(e.to_string())),
            }
        }
    }

    fn treatment_content() -> ProtocolContent {
        ProtocolContent::new()
            .with_section(SectionContent::new(
                SectionNumber::new(1).unwrap(),
                "Identification",
                json!("Protocol metadata"),
            ))
            .with_section(SectionContent::new(
                SectionNumber::new(7).unwrap(),
                "Treatment",
                json!("If A, then B. If not A, then C."),
            ))
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn test_empty_content_skips_model() {
        init_logs();
        let model = Arc::new(ScriptedModel::returning("{}"));
        let pipeline = FlowchartPipeline::new(model.clone());

        let result = pipeline
            .generate("proto-1", &ProtocolContent::new(), "Sepsis")
            .await
            .unwrap();

        assert!(result.graph.nodes.is_empty());
        assert!(result.graph.edges.is_empty());
        assert!(result.report.is_valid);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_only_relevant_sections_sent() {
        let output = json!({
            "nodes": [
                { "id": "node-1", "type": "start", "data": { "title": "Start" } },
                { "id": "node-2", "type": "decision", "data": { "title": "Condition A?", "criteria": "A is true" } }
            ],
            "edges": [ { "id": "edge-1-2", "source": "node-1", "target": "node-2" } ]
        });
        let model = Arc::new(ScriptedModel::returning(output.to_string()));
        let pipeline = FlowchartPipeline::new(model.clone());

        let result = pipeline
            .generate("proto-1", &treatment_content(), "Test Condition")
            .await
            .unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        let request = model.last_request.lock().unwrap().clone().unwrap();
        let sent: Vec<u8> = request.sections.iter().map(|s| s.section_number.get()).collect();
        assert_eq!(sent, vec![7]);
        assert_eq!(request.condition, "Test Condition");

        assert_eq!(result.graph.nodes.len(), 2);
        assert_eq!(result.graph.edges.len(), 1);
        for node in &result.graph.nodes {
            assert_eq!(node.position, Some(Position::ORIGIN));
            assert_eq!(node.data.kind, Some(node.kind));
        }
        assert!(result.accepts_silently());
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_failure() {
        let pipeline = FlowchartPipeline::new(ScriptedModel::returning("this is not json"));
        let err = pipeline
            .generate("proto-1", &treatment_content(), "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowchartError::MalformedJson(_)));
    }

    #[tokio::test]
    async fn test_invalid_structure_is_schema_failure() {
        let output = json!({ "nodes": [{ "id": "1" }], "edges": "not an array" });
        let pipeline = FlowchartPipeline::new(ScriptedModel::returning(output.to_string()));
        let err = pipeline
            .generate("proto-1", &treatment_content(), "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowchartError::Schema(_)));
        assert!(err.to_string().contains("invalid structure"));
    }

    #[tokio::test]
    async fn test_empty_model_output() {
        let pipeline = FlowchartPipeline::new(ScriptedModel::returning("  "));
        let err = pipeline
            .generate("proto-1", &treatment_content(), "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowchartError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let pipeline = FlowchartPipeline::new(ScriptedModel::failing("rate limited"));
        let err = pipeline
            .generate("proto-1", &treatment_content(), "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowchartError::Model(_)));
    }

    #[tokio::test]
    async fn test_missing_ids_are_assigned() {
        let output = json!({
            "nodes": [
                { "type": "start", "data": { "title": "Start" } },
                { "id": "node-abc", "type": "decision", "data": { "title": "Decision 1", "criteria": "X > 10" } },
                { "id": "node-def", "type": "end", "data": { "title": "End" } }
            ],
            "edges": [ { "source": "node-abc", "target": "node-def" } ]
        });
        let pipeline = FlowchartPipeline::new(ScriptedModel::returning(output.to_string()));
        let result = pipeline
            .generate("proto-1", &treatment_content(), "Test")
            .await
            .unwrap();

        assert_eq!(result.graph.node_ids(), vec!["node-0", "node-abc", "node-def"]);
        assert_eq!(result.graph.edge_ids(), vec!["edge-0"]);
        // Decision edge without a handle gets the default one
        assert_eq!(result.graph.edges[0].source_handle.as_deref(), Some(DEFAULT_DECISION_HANDLE));
    }

    #[test]
    fn test_self_loop_surfaces_as_issue_not_error() {
        let output = json!({
            "nodes": [{ "id": "A", "type": "action", "data": { "title": "Loop" } }],
            "edges": [{ "source": "A", "target": "A", "sourceHandle": "out" }]
        });
        let result = process_model_output(&output.to_string()).unwrap();
        assert!(!result.accepts_silently());
        assert_eq!(result.report.issues.len(), 1);
        assert_eq!(result.report.issues[0].rule_id, SELF_LOOP_RULE);
        assert_eq!(result.graph.edges[0].source_handle.as_deref(), Some("out"));
    }
}
