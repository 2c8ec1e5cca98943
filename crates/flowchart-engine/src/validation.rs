//! Structural validation for normalized flowcharts
//!
//! Rules run independently over the same graph snapshot and their issues are
//! concatenated in rule order. Nothing here mutates the graph or decides
//! acceptance; callers apply their own severity policy.
//!
//! Not checked by this version: general cycles (only single-node self-loops)
//! and edges whose `source`/`target` do not resolve to a node in the graph.

use std::collections::HashSet;

use protocol_contracts::{IssueCategory, ValidationIssue, ValidationReport};
use serde_json::json;

use crate::types::FlowchartGraph;

/// Rule id for nodes with no connections
pub const ORPHAN_NODE_RULE: &str = "FLOWCHART_ORPHAN_NODE";

/// Rule id for edges that point back at their own source
pub const SELF_LOOP_RULE: &str = "FLOWCHART_SELF_LOOP";

/// Signature of a rule check
pub type RuleCheck = fn(&FlowchartGraph) -> Vec<ValidationIssue>;

/// A registered validation rule
///
/// Each check sets the severity and category of the issues it raises.
pub struct FlowchartRule {
    pub id: &'static str,
    pub description: &'static str,
    pub check: RuleCheck,
}

/// All flowchart rules, in execution order
pub static FLOWCHART_RULES: [FlowchartRule; 2] = [
    FlowchartRule {
        id: "FLOWCHART_ORPHAN_NODES",
        description: "Checks for nodes that are not connected to the flow (start/end nodes exempt)",
        check: check_orphan_nodes,
    },
    FlowchartRule {
        id: "FLOWCHART_INFINITE_LOOPS",
        description: "Checks for nodes that feed directly into themselves",
        check: check_self_loops,
    },
];

/// Validate a normalized flowchart
///
/// Returns all issues found (not just the first). The graph is assumed to
/// be normalized; ids are not re-checked.
pub fn validate_flowchart(graph: &FlowchartGraph) -> Vec<ValidationIssue> {
    let issues: Vec<ValidationIssue> = FLOWCHART_RULES
        .iter()
        .flat_map(|rule| {
            let found = (rule.check)(graph);
            if !found.is_empty() {
                log::debug!("{} ({}): {} issue(s)", rule.id, rule.description, found.len());
            }
            found
        })
        .collect();

    log::debug!(
        "Flowchart validation: {} nodes, {} edges, {} issues",
        graph.nodes.len(),
        graph.edges.len(),
        issues.len()
    );

    issues
}

/// Validate and aggregate into a report
pub fn validate_with_report(graph: &FlowchartGraph) -> ValidationReport {
    ValidationReport::from_issues(validate_flowchart(graph))
}

/// Flag non-start/end nodes that appear in no edge at all
///
/// Only applies to graphs with more than one node. A start node without
/// outgoing edges and an end node without incoming edges are not flagged.
fn check_orphan_nodes(graph: &FlowchartGraph) -> Vec<ValidationIssue> {
    if graph.nodes.len() <= 1 {
        return Vec::new();
    }

    let connected: HashSet<&str> = graph
        .edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();

    graph
        .nodes
        .iter()
        .filter(|node| !node.kind.is_terminal() && !connected.contains(node.id.as_str()))
        .map(|node| {
            ValidationIssue::warning(
                ORPHAN_NODE_RULE,
                IssueCategory::FlowchartConsistency,
                format!(
                    "Node \"{}\" (ID: {}, type: {}) appears to be orphaned (no incoming or outgoing connections)",
                    node.data.title,
                    node.id,
                    node.kind.as_str()
                ),
            )
            .with_details(json!({ "nodeId": node.id, "nodeTitle": node.data.title }))
        })
        .collect()
}

/// Flag every edge whose source equals its target
fn check_self_loops(graph: &FlowchartGraph) -> Vec<ValidationIssue> {
    graph
        .edges
        .iter()
        .filter(|edge| edge.is_self_loop())
        .map(|edge| {
            ValidationIssue::error(
                SELF_LOOP_RULE,
                IssueCategory::FlowchartConsistency,
                format!(
                    "Node \"{}\" points directly at itself, creating an infinite loop",
                    edge.source
                ),
            )
            .with_details(json!({ "nodeId": edge.source, "edgeId": edge.id }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FlowchartBuilder;
    use crate::types::NodeKind;
    use protocol_contracts::Severity;

    #[test]
    fn test_valid_graph() {
        let graph = FlowchartBuilder::new()
            .add_node("s", NodeKind::Start, "Start")
            .add_node("d", NodeKind::Decision, "Fever?")
            .add_node("a", NodeKind::Action, "Give antipyretic")
            .add_node("e", NodeKind::End, "Discharge")
            .add_edge("s", "d")
            .add_edge("d", "a")
            .add_edge("a", "e")
            .build();

        let issues = validate_flowchart(&graph);
        assert!(issues.is_empty(), "Expected no issues, got: {:?}", issues);
    }

    #[test]
    fn test_self_loop_is_one_error() {
        let graph = FlowchartBuilder::new()
            .add_node("A", NodeKind::Action, "Repeat")
            .add_edge("A", "A")
            .build();

        let issues = validate_flowchart(&graph);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, SELF_LOOP_RULE);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].details["nodeId"], "A");
    }

    #[test]
    fn test_orphan_in_three_node_graph() {
        let graph = FlowchartBuilder::new()
            .add_node("A", NodeKind::Start, "Start")
            .add_node("B", NodeKind::End, "End")
            .add_node("C", NodeKind::Action, "Forgotten")
            .add_edge("A", "B")
            .build();

        let issues = validate_flowchart(&graph);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, ORPHAN_NODE_RULE);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].details["nodeId"], "C");
        assert_eq!(issues[0].details["nodeTitle"], "Forgotten");
    }

    #[test]
    fn test_single_node_never_orphaned() {
        for kind in [NodeKind::Action, NodeKind::Decision, NodeKind::Start, NodeKind::Triage] {
            let graph = FlowchartBuilder::new().add_node("only", kind, "Only").build();
            assert!(validate_flowchart(&graph).is_empty());
        }
    }

    #[test]
    fn test_node_with_one_side_connected_is_not_orphan() {
        let graph = FlowchartBuilder::new()
            .add_node("s", NodeKind::Start, "Start")
            .add_node("dead-end", NodeKind::Action, "No way out")
            .add_edge("s", "dead-end")
            .build();
        assert!(validate_flowchart(&graph).is_empty());
    }

    #[test]
    fn test_unconnected_start_and_end_not_flagged() {
        // Known gap: start without outgoing / end without incoming edges pass.
        let graph = FlowchartBuilder::new()
            .add_node("s", NodeKind::Start, "Start")
            .add_node("e", NodeKind::End, "End")
            .add_node("t", NodeKind::Triage, "Triage")
            .add_edge("t", "t")
            .build();

        let issues = validate_flowchart(&graph);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, SELF_LOOP_RULE);
    }

    #[test]
    fn test_dangling_edge_reference_not_flagged() {
        // Known gap: edges to unknown nodes are not reported.
        let graph = FlowchartBuilder::new()
            .add_node("s", NodeKind::Start, "Start")
            .add_node("e", NodeKind::End, "End")
            .add_edge("s", "missing")
            .add_edge("missing", "e")
            .build();
        assert!(validate_flowchart(&graph).is_empty());
    }

    #[test]
    fn test_longer_cycles_not_detected() {
        let graph = FlowchartBuilder::new()
            .add_node("a", NodeKind::Action, "A")
            .add_node("b", NodeKind::Action, "B")
            .add_edge("a", "b")
            .add_edge("b", "a")
            .build();
        assert!(validate_flowchart(&graph).is_empty());
    }

    #[test]
    fn test_orphan_issues_precede_self_loop_issues() {
        let graph = FlowchartBuilder::new()
            .add_node("loop", NodeKind::Action, "Loop")
            .add_node("lonely", NodeKind::Medication, "Lonely")
            .add_edge("loop", "loop")
            .build();

        let rule_ids: Vec<String> = validate_flowchart(&graph)
            .into_iter()
            .map(|i| i.rule_id)
            .collect();
        assert_eq!(rule_ids, vec![ORPHAN_NODE_RULE, SELF_LOOP_RULE]);
    }

    #[test]
    fn test_report_verdict() {
        let graph = FlowchartBuilder::new()
            .add_node("loop", NodeKind::Action, "Loop")
            .add_edge("loop", "loop")
            .build();
        let report = validate_with_report(&graph);
        assert!(!report.is_valid);
        assert_eq!(report.summary.errors, 1);
    }

    #[test]
    fn test_rules_run_in_table_order() {
        let ids: Vec<&str> = FLOWCHART_RULES.iter().map(|rule| rule.id).collect();
        assert_eq!(ids, vec!["FLOWCHART_ORPHAN_NODES", "FLOWCHART_INFINITE_LOOPS"]);

        let graph = FlowchartBuilder::new()
            .add_node("s", NodeKind::Start, "Start")
            .add_node("o", NodeKind::Action, "Orphan")
            .add_node("l", NodeKind::Action, "Loop")
            .add_edge("l", "l")
            .build();
        let severities: Vec<Severity> = validate_flowchart(&graph).iter().map(|i| i.severity).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Error]);
    }
}
