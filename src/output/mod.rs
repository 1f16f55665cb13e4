//! CLI output contract.
//!
//! Every command can emit human text or a schema-versioned JSON envelope.
//! The envelope shape is stable: automation keys off `schema_version` and
//! the per-command `data` payload.

use serde::Serialize;

use crate::drift::DriftFinding;
use crate::error::ParseFailure;
use crate::graph::{ImpactResult, Neighbor, NodeTemperature};
use crate::intent::IntentWarning;

/// JSON envelope schema version. Bump on breaking payload changes.
pub const SEXTANT_JSON_SCHEMA_VERSION: &str = "1.0";

/// Output format selected with `--output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Human,
    /// Compact JSON with schema versioning
    Json,
    /// Pretty-printed JSON with schema versioning
    Pretty,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            "pretty" => Some(OutputFormat::Pretty),
            _ => None,
        }
    }

    pub fn is_json(&self) -> bool {
        !matches!(self, OutputFormat::Human)
    }
}

/// Schema-versioned envelope wrapping every JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    /// Unique id for this invocation, for log correlation
    pub execution_id: String,
    pub tool: String,
    pub timestamp: String,
    pub command: String,
    pub data: T,
}

impl<T> JsonResponse<T> {
    pub fn new(command: &str, data: T) -> Self {
        JsonResponse {
            schema_version: SEXTANT_JSON_SCHEMA_VERSION.to_string(),
            execution_id: generate_execution_id(),
            tool: "sextant".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            command: command.to_string(),
            data,
        }
    }
}

/// Timestamp + pid execution id; unique enough for log correlation.
pub fn generate_execution_id() -> String {
    format!("{}-{}", crate::common::now_unix(), std::process::id())
}

/// Serialize a payload to stdout in the selected JSON flavor.
pub fn output_json<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    let json = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(data)?,
        _ => serde_json::to_string(data)?,
    };
    println!("{}", json);
    Ok(())
}

// ===== Per-command payloads =====

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub project: String,
    pub root: String,
    pub full: bool,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_unsupported: usize,
    pub files_removed: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub intent_documents: usize,
    pub intent_warnings: Vec<IntentWarning>,
    pub parse_failures: Vec<ParseFailure>,
    pub hard_failures: Vec<ParseFailure>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct DriftResponse {
    pub project: String,
    pub findings: Vec<DriftFinding>,
    pub critical_count: usize,
    pub intent_nodes: usize,
    pub reality_nodes: usize,
}

#[derive(Debug, Serialize)]
pub struct NeighborsResponse {
    pub project: String,
    pub node: String,
    pub depth: usize,
    pub neighbors: Vec<Neighbor>,
}

#[derive(Debug, Serialize)]
pub struct ImpactResponse {
    pub project: String,
    pub impact: ImpactResult,
}

#[derive(Debug, Serialize)]
pub struct TemperatureResponse {
    pub project: String,
    pub window_days: i64,
    pub nodes: Vec<NodeTemperature>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub project: String,
    pub root: Option<String>,
    pub reality_nodes: usize,
    pub intent_nodes: usize,
    pub edges: usize,
    pub tracked_files: usize,
    pub node_kinds: Vec<String>,
    pub edge_kinds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("human"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("pretty"), Some(OutputFormat::Pretty));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn test_envelope_carries_schema_version() {
        let resp = JsonResponse::new("status", ErrorResponse { error: "x".into() });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"schema_version\":\"1.0\""));
        assert!(json.contains("\"tool\":\"sextant\""));
        assert!(json.contains("\"command\":\"status\""));
    }
}
