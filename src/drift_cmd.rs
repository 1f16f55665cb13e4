//! Drift command implementation.
//!
//! Assembles the comparator inputs from the store (intent layer, reality
//! layer, test evidence from covers edges), runs the pure comparison, and
//! maps critical findings to a non-zero exit code for CI use.

use std::path::Path;
use std::process::ExitCode;

use ahash::AHashSet;
use anyhow::Result;
use sextant::drift::{compare, DriftConfig, DriftKind, Evidence, RealitySnapshot, Severity};
use sextant::graph::{Layer, NodeKind};
use sextant::output::{output_json, DriftResponse, JsonResponse, OutputFormat};
use sextant::GraphStore;

pub fn run(
    db: &Path,
    project: &str,
    intent_filter: Option<&str>,
    staleness_days: i64,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;
    store.require_nonempty(project)?;

    let intent_nodes = store.list_nodes(project, Some(Layer::Intent), None)?;
    let reality_nodes = store.list_nodes(project, Some(Layer::Reality), None)?;
    let all_edges = store.list_edges(project)?;

    let intent_ids: AHashSet<&str> = intent_nodes.iter().map(|n| n.id.as_str()).collect();
    let intent_edges: Vec<_> = all_edges
        .iter()
        .filter(|e| intent_ids.contains(e.from_id.as_str()))
        .cloned()
        .collect();

    // Test evidence: anything a test-kind intent entry claims to cover
    let mut evidence = Evidence::default();
    for node in &intent_nodes {
        if NodeKind::parse(&node.kind) != NodeKind::Test {
            continue;
        }
        for edge in intent_edges.iter().filter(|e| e.from_id == node.id) {
            evidence.tested.insert(edge.to_id.clone());
        }
    }

    let reality = RealitySnapshot {
        nodes: reality_nodes,
        edges: all_edges
            .iter()
            .filter(|e| !intent_ids.contains(e.from_id.as_str()))
            .cloned()
            .collect(),
    };

    let config = DriftConfig { staleness_days };

    let mut findings = compare(&intent_nodes, &intent_edges, &reality, &evidence, &config);
    if let Some(filter) = intent_filter {
        findings.retain(|f| f.intent_item.as_deref() == Some(filter));
    }

    let critical_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    // Gate: criticals always fail; an unimplemented required intent fails
    // even at high severity, since that is exactly what CI runs exist to catch
    let gate_failed = critical_count > 0
        || findings.iter().any(|f| {
            f.kind == DriftKind::MissingImplementation
                && matches!(f.severity, Severity::Critical | Severity::High)
        });
    let response = DriftResponse {
        project: project.to_string(),
        critical_count,
        intent_nodes: intent_nodes.len(),
        reality_nodes: reality.nodes.len(),
        findings,
    };

    if output_format.is_json() {
        output_json(&JsonResponse::new("drift", &response), output_format)?;
    } else if response.findings.is_empty() {
        println!(
            "No drift: {} intent entries match {} reality nodes",
            response.intent_nodes, response.reality_nodes
        );
    } else {
        println!(
            "{} finding(s) for project '{}':",
            response.findings.len(),
            project
        );
        for finding in &response.findings {
            println!(
                "  [{}] {} {}",
                finding.severity.as_str(),
                finding.kind.as_str(),
                finding.description
            );
            println!("         suggestion: {}", finding.suggestion);
        }
    }

    if gate_failed {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
