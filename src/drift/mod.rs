//! Drift comparator: intent vs reality.
//!
//! `compare` is a pure function over graph snapshots. Same inputs, same
//! findings, same order; automated checks diff its output byte for byte.

use ahash::AHashSet;
use serde::Serialize;

use crate::graph::{EdgeKind, EdgeRow, NodeKind, NodeRow};

/// Classification of one divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// Required intent with no matching code
    MissingImplementation,
    /// Significant code with no covering intent or test
    MissingSpec,
    /// Code changed since the intent was last validated
    Mismatch,
    /// Code changed long ago and the intent was never revalidated
    StaleSpec,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::MissingImplementation => "missing_implementation",
            DriftKind::MissingSpec => "missing_spec",
            DriftKind::Mismatch => "mismatch",
            DriftKind::StaleSpec => "stale_spec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

/// One reported divergence.
#[derive(Debug, Clone, Serialize)]
pub struct DriftFinding {
    #[serde(rename = "type")]
    pub kind: DriftKind,
    pub severity: Severity,
    pub intent_item: Option<String>,
    pub code_item: Option<String>,
    pub description: String,
    pub suggestion: String,
}

/// Comparator knobs. Severity is a static table, deliberately not here.
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Days a code change may postdate the intent's `last_validated`
    /// before `mismatch` escalates to `stale_spec`
    pub staleness_days: i64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        DriftConfig { staleness_days: 30 }
    }
}

/// External evidence the comparator may consult.
#[derive(Debug, Default)]
pub struct Evidence {
    /// Reality node ids with known test coverage
    pub tested: AHashSet<String>,
}

/// Reality graph snapshot handed to the comparator.
#[derive(Debug, Default)]
pub struct RealitySnapshot {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

/// Compare declared intent against extracted reality.
///
/// # Behavior
/// Per intent node with a `ref`: resolve the ref against reality (exact id,
/// then name + location, then bare name). Required refs that do not resolve
/// are `missing_implementation`. Resolved refs whose code changed after the
/// intent's `last_validated` are `mismatch`, escalating to `stale_spec`
/// once the change postdates validation by more than the staleness
/// threshold. Separately, significant
/// reality nodes (apis, exported functions) with no covering intent, no
/// test evidence, and no test location are `missing_spec`.
///
/// # Guarantees
/// Deterministic: findings are fully ordered by (severity, type, intent
/// item, code item, description).
pub fn compare(
    intent_nodes: &[NodeRow],
    intent_edges: &[EdgeRow],
    reality: &RealitySnapshot,
    evidence: &Evidence,
    config: &DriftConfig,
) -> Vec<DriftFinding> {
    let mut findings = Vec::new();

    for intent in intent_nodes {
        let kind = NodeKind::parse(&intent.kind);
        let Some(reference) = intent.reference.as_deref() else {
            continue;
        };
        match resolve_ref(reference, reality) {
            None => {
                if intent.required {
                    findings.push(DriftFinding {
                        kind: DriftKind::MissingImplementation,
                        severity: missing_implementation_severity(&kind),
                        intent_item: Some(intent.id.clone()),
                        code_item: None,
                        description: format!(
                            "required intent '{}' declares ref '{}' but no matching code exists",
                            intent.id, reference
                        ),
                        suggestion: format!(
                            "implement '{}' or drop the requirement from '{}'",
                            reference,
                            intent.file_path.as_deref().unwrap_or("the intent document")
                        ),
                    });
                }
            }
            Some(code) => {
                let validated = intent.last_validated.unwrap_or(intent.last_updated);
                if code.last_updated > validated {
                    let lag_days = (code.last_updated - validated) / 86_400;
                    if lag_days > config.staleness_days {
                        findings.push(DriftFinding {
                            kind: DriftKind::StaleSpec,
                            severity: stale_spec_severity(&kind),
                            intent_item: Some(intent.id.clone()),
                            code_item: Some(code.id.clone()),
                            description: format!(
                                "'{}' changed {} days after intent '{}' was last validated",
                                code.id, lag_days, intent.id
                            ),
                            suggestion: format!(
                                "review '{}' against the current code and revalidate",
                                intent.id
                            ),
                        });
                    } else {
                        findings.push(DriftFinding {
                            kind: DriftKind::Mismatch,
                            severity: mismatch_severity(&kind),
                            intent_item: Some(intent.id.clone()),
                            code_item: Some(code.id.clone()),
                            description: format!(
                                "'{}' changed after intent '{}' was last validated",
                                code.id, intent.id
                            ),
                            suggestion: format!(
                                "confirm '{}' still satisfies '{}' and revalidate",
                                code.id, intent.id
                            ),
                        });
                    }
                }
            }
        }
    }

    findings.extend(missing_spec_findings(
        intent_nodes,
        intent_edges,
        reality,
        evidence,
    ));

    findings.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
            .then_with(|| a.intent_item.cmp(&b.intent_item))
            .then_with(|| a.code_item.cmp(&b.code_item))
            .then_with(|| a.description.cmp(&b.description))
    });
    findings
}

/// Resolve an intent `ref` against the reality snapshot.
///
/// Resolution order: exact node id, then name plus location scope, then
/// bare name. Ambiguity breaks on sorted node id so resolution never
/// depends on extraction order.
pub fn resolve_ref<'a>(reference: &str, reality: &'a RealitySnapshot) -> Option<&'a NodeRow> {
    if let Some(exact) = reality.nodes.iter().find(|n| n.id == reference) {
        return Some(exact);
    }

    let (scope, name) = match reference.rsplit_once('.') {
        Some((scope, name)) => (Some(scope), name),
        None => (None, reference),
    };

    let mut candidates: Vec<&NodeRow> = reality
        .nodes
        .iter()
        .filter(|n| name_matches(&n.name, name))
        .collect();
    if let Some(scope) = scope {
        let slash_scope = scope.replace('.', "/");
        let scoped: Vec<&NodeRow> = candidates
            .iter()
            .copied()
            .filter(|n| {
                n.file_path
                    .as_deref()
                    .map(|p| p.contains(scope) || p.contains(&slash_scope))
                    .unwrap_or(false)
                    || n.name.contains(scope)
            })
            .collect();
        if !scoped.is_empty() {
            candidates = scoped;
        } else {
            // A scoped ref must not fall back to a bare-name match in some
            // unrelated location
            return None;
        }
    }
    candidates.sort_by(|a, b| a.id.cmp(&b.id));
    candidates.into_iter().next()
}

fn name_matches(node_name: &str, wanted: &str) -> bool {
    node_name == wanted
        || node_name.ends_with(&format!("::{wanted}"))
        || node_name.ends_with(&format!(".{wanted}"))
}

fn missing_spec_findings(
    intent_nodes: &[NodeRow],
    intent_edges: &[EdgeRow],
    reality: &RealitySnapshot,
    evidence: &Evidence,
) -> Vec<DriftFinding> {
    // Everything intent reaches: resolved refs plus covers targets
    let mut covered: AHashSet<String> = AHashSet::new();
    for intent in intent_nodes {
        if let Some(reference) = intent.reference.as_deref() {
            if let Some(code) = resolve_ref(reference, reality) {
                covered.insert(code.id.clone());
            }
        }
    }
    for edge in intent_edges {
        if edge.kind == EdgeKind::Covers.as_str() {
            covered.insert(edge.to_id.clone());
        }
    }

    let mut findings = Vec::new();
    for node in &reality.nodes {
        let kind = NodeKind::parse(&node.kind);
        if !is_significant(node, &kind) {
            continue;
        }
        if covered.contains(&node.id) || evidence.tested.contains(&node.id) {
            continue;
        }
        if node
            .file_path
            .as_deref()
            .map(|p| p.contains("test"))
            .unwrap_or(false)
        {
            continue;
        }
        findings.push(DriftFinding {
            kind: DriftKind::MissingSpec,
            severity: missing_spec_severity(&kind),
            intent_item: None,
            code_item: Some(node.id.clone()),
            description: format!(
                "'{}' ({}) has no covering intent or test",
                node.id, node.kind
            ),
            suggestion: format!("declare intent for '{}' or add a covering test", node.name),
        });
    }
    findings
}

/// Significant = worth flagging when undeclared: apis always, functions
/// only when exported (public in Rust, non-underscore elsewhere).
fn is_significant(node: &NodeRow, kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Api => true,
        NodeKind::Function => {
            let bare = node
                .name
                .rsplit("::")
                .next()
                .unwrap_or(node.name.as_str());
            if bare.starts_with('_') {
                return false;
            }
            match node.signature.as_deref() {
                // Rust: a signature starting with `fn` (no visibility) is private
                Some(sig) => !sig.starts_with("fn "),
                None => true,
            }
        }
        _ => false,
    }
}

fn missing_implementation_severity(kind: &NodeKind) -> Severity {
    match kind {
        NodeKind::Api => Severity::Critical,
        NodeKind::Flow => Severity::High,
        NodeKind::Doc => Severity::Low,
        _ => Severity::Medium,
    }
}

fn mismatch_severity(kind: &NodeKind) -> Severity {
    match kind {
        NodeKind::Api | NodeKind::Flow => Severity::High,
        NodeKind::Doc => Severity::Low,
        _ => Severity::Medium,
    }
}

fn stale_spec_severity(kind: &NodeKind) -> Severity {
    match kind {
        NodeKind::Api | NodeKind::Flow => Severity::Medium,
        _ => Severity::Low,
    }
}

fn missing_spec_severity(kind: &NodeKind) -> Severity {
    match kind {
        NodeKind::Api => Severity::High,
        NodeKind::Function | NodeKind::Class => Severity::Medium,
        _ => Severity::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Layer;

    fn intent_node(id: &str, kind: &str, reference: Option<&str>, required: bool) -> NodeRow {
        NodeRow {
            id: id.to_string(),
            project: "p".to_string(),
            layer: Layer::Intent.as_str().to_string(),
            kind: kind.to_string(),
            name: id.to_string(),
            file_path: Some("docs/intent.md".to_string()),
            line_start: None,
            line_end: None,
            reference: reference.map(str::to_string),
            signature: None,
            content_hash: None,
            required,
            last_updated: 1_000_000,
            last_validated: Some(1_000_000),
        }
    }

    fn reality_node(id: &str, kind: &str, name: &str, file: &str, updated: i64) -> NodeRow {
        NodeRow {
            id: id.to_string(),
            project: "p".to_string(),
            layer: Layer::Reality.as_str().to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            file_path: Some(file.to_string()),
            line_start: Some(1),
            line_end: Some(10),
            reference: None,
            signature: Some(format!("pub fn {name}()")),
            content_hash: Some("abc".to_string()),
            required: false,
            last_updated: updated,
            last_validated: None,
        }
    }

    #[test]
    fn test_required_unmatched_ref_is_missing_implementation() {
        // flow.auth requires auth.login; reality has nothing under auth
        let intents = [intent_node("flow.auth", "flow", Some("auth.login"), true)];
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                900_000,
            )],
            edges: vec![],
        };
        let findings = compare(
            &intents,
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        let missing: Vec<_> = findings
            .iter()
            .filter(|f| f.kind == DriftKind::MissingImplementation)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].severity, Severity::High);
        assert_eq!(missing[0].intent_item.as_deref(), Some("flow.auth"));
    }

    #[test]
    fn test_dropping_required_drops_the_finding() {
        let intents = [intent_node("flow.auth", "flow", Some("auth.login"), false)];
        let findings = compare(
            &intents,
            &[],
            &RealitySnapshot::default(),
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings
            .iter()
            .all(|f| f.kind != DriftKind::MissingImplementation));
    }

    #[test]
    fn test_ref_resolves_by_name_and_location() {
        let intents = [intent_node("flow.auth", "flow", Some("auth.login"), true)];
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/auth.rs:login",
                "function",
                "login",
                "src/auth.rs",
                900_000,
            )],
            edges: vec![],
        };
        let findings = compare(
            &intents,
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings
            .iter()
            .all(|f| f.kind != DriftKind::MissingImplementation));
    }

    #[test]
    fn test_scoped_ref_does_not_match_wrong_location() {
        // login exists, but not under auth
        let intents = [intent_node("flow.auth", "flow", Some("auth.login"), true)];
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/admin.rs:login",
                "function",
                "login",
                "src/admin.rs",
                900_000,
            )],
            edges: vec![],
        };
        let findings = compare(
            &intents,
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings
            .iter()
            .any(|f| f.kind == DriftKind::MissingImplementation));
    }

    #[test]
    fn test_recent_code_change_is_a_mismatch() {
        let mut intent = intent_node("api.charge", "api", Some("pay.charge"), true);
        intent.last_validated = Some(1_000_000);
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                1_000_500,
            )],
            edges: vec![],
        };
        // Change landed minutes after validation: inside the window
        let findings = compare(
            &[intent],
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        let mismatch = findings
            .iter()
            .find(|f| f.kind == DriftKind::Mismatch)
            .unwrap();
        assert_eq!(mismatch.severity, Severity::High);
    }

    #[test]
    fn test_classification_keys_on_change_lag_not_report_time() {
        // A change 500s after validation stays a mismatch no matter how
        // long ago both happened
        let mut intent = intent_node("api.charge", "api", Some("pay.charge"), true);
        intent.last_validated = Some(1_000_000);
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                1_000_500,
            )],
            edges: vec![],
        };
        let findings = compare(
            &[intent],
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings.iter().any(|f| f.kind == DriftKind::Mismatch));
        assert!(findings.iter().all(|f| f.kind != DriftKind::StaleSpec));
    }

    #[test]
    fn test_old_unvalidated_change_is_stale_spec() {
        let mut intent = intent_node("api.charge", "api", Some("pay.charge"), true);
        intent.last_validated = Some(1_000_000);
        // The code moved 90 days after validation, never revalidated
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                1_000_000 + 90 * 86_400,
            )],
            edges: vec![],
        };
        let findings = compare(
            &[intent],
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings.iter().any(|f| f.kind == DriftKind::StaleSpec));
        assert!(findings.iter().all(|f| f.kind != DriftKind::Mismatch));
    }

    #[test]
    fn test_uncovered_exported_function_is_missing_spec() {
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                900_000,
            )],
            edges: vec![],
        };
        let findings = compare(
            &[],
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, DriftKind::MissingSpec);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_private_functions_are_not_flagged() {
        let mut private = reality_node(
            "function.src/pay.rs:helper",
            "function",
            "helper",
            "src/pay.rs",
            900_000,
        );
        private.signature = Some("fn helper()".to_string());
        let reality = RealitySnapshot {
            nodes: vec![private],
            edges: vec![],
        };
        let findings = compare(
            &[],
            &[],
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_covers_edge_suppresses_missing_spec() {
        let intents = [intent_node("flow.pay", "flow", None, false)];
        let covers = [EdgeRow {
            project: "p".to_string(),
            from_id: "flow.pay".to_string(),
            to_id: "function.src/pay.rs:charge".to_string(),
            kind: "covers".to_string(),
            confidence: 1.0,
            line_number: None,
            file_path: Some("docs/intent.md".to_string()),
            dangling: false,
            dangling_passes: 0,
        }];
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                900_000,
            )],
            edges: vec![],
        };
        let findings = compare(
            &intents,
            &covers,
            &reality,
            &Evidence::default(),
            &DriftConfig::default(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_test_evidence_suppresses_missing_spec() {
        let reality = RealitySnapshot {
            nodes: vec![reality_node(
                "function.src/pay.rs:charge",
                "function",
                "charge",
                "src/pay.rs",
                900_000,
            )],
            edges: vec![],
        };
        let mut evidence = Evidence::default();
        evidence
            .tested
            .insert("function.src/pay.rs:charge".to_string());
        let findings = compare(&[], &[], &reality, &evidence, &DriftConfig::default());
        assert!(findings.is_empty());
    }

    #[test]
    fn test_findings_are_deterministically_ordered() {
        let intents = [
            intent_node("flow.b", "flow", Some("missing.b"), true),
            intent_node("flow.a", "flow", Some("missing.a"), true),
            intent_node("api.z", "api", Some("missing.z"), true),
        ];
        let run = || {
            compare(
                &intents,
                &[],
                &RealitySnapshot::default(),
                &Evidence::default(),
                &DriftConfig::default(),
            )
        };
        let first = run();
        let second = run();
        let ids = |fs: &[DriftFinding]| {
            fs.iter()
                .map(|f| f.intent_item.clone().unwrap_or_default())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        // Critical api first, then the flows in id order
        assert_eq!(ids(&first), vec!["api.z", "flow.a", "flow.b"]);
    }
}
