//! Source extraction: turning files into graph fragments.
//!
//! Extractors are pure: source text in, nodes and edges out, no database
//! access. Name resolution is file-scoped; references an extractor cannot
//! resolve inside the file are either dropped (call guesses) or emitted as
//! shared module nodes (imports), and the merge layer's dangling markers
//! absorb whatever goes missing later.

mod python;
mod rust;

use crate::error::ParseFailure;
use crate::graph::{EdgeKind, NodeKind};
use std::path::Path;

/// Languages with a wired-up grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
}

impl Language {
    /// Detect by file extension. `None` means the file is tracked in the
    /// ledger but yields no graph fragment.
    pub fn from_path(path: &Path) -> Option<Language> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => Some(Language::Rust),
            Some("py") => Some(Language::Python),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
        }
    }
}

/// Node produced by an extractor, before store attribution.
#[derive(Debug, Clone)]
pub struct CodeNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub line_start: i64,
    pub line_end: i64,
    pub signature: Option<String>,
    /// Hash of the node's defining text; drift uses it to spot edits
    pub content_hash: String,
}

/// Edge produced by an extractor.
#[derive(Debug, Clone)]
pub struct CodeEdge {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    /// 1.0 for structural facts, lower for name-resolution guesses
    pub confidence: f64,
    pub line_number: Option<i64>,
}

/// One file's worth of graph fragment.
#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
}

impl Extraction {
    pub(crate) fn push_node(&mut self, node: CodeNode) {
        self.nodes.push(node);
    }

    pub(crate) fn push_edge(&mut self, edge: CodeEdge) {
        // The (from, to, kind) triple is the store primary key
        if !self
            .edges
            .iter()
            .any(|e| e.from_id == edge.from_id && e.to_id == edge.to_id && e.kind == edge.kind)
        {
            self.edges.push(edge);
        }
    }
}

/// Stable node id for a file: `file.{path}`.
pub fn file_node_id(file_key: &str) -> String {
    format!("file.{}", file_key)
}

/// Stable node id for a named symbol: `{kind}.{path}:{name}`.
pub fn symbol_node_id(kind: &NodeKind, file_key: &str, name: &str) -> String {
    format!("{}.{}:{}", kind.as_str(), file_key, name)
}

/// Stable node id for an imported module: `module.{import}`.
///
/// Shared across files: every importer emits the same id, so the node is
/// owned by whichever file merged last and dangles briefly when that file
/// goes away.
pub fn module_node_id(import_path: &str) -> String {
    format!("module.{}", import_path)
}

/// Extract a graph fragment from one source file.
///
/// # Arguments
/// * `language` - Grammar to use
/// * `file_key` - Normalized project-relative path, used in node ids
/// * `source` - Full file contents
/// * `timeout_micros` - Per-file parse budget; exceeding it is a soft failure
///
/// # Returns
/// The fragment, or a `ParseFailure` the caller records without aborting
/// the pass.
pub fn extract_source(
    language: Language,
    file_key: &str,
    source: &str,
    timeout_micros: u64,
) -> Result<Extraction, ParseFailure> {
    match language {
        Language::Rust => rust::extract(file_key, source, timeout_micros),
        Language::Python => python::extract(file_key, source, timeout_micros),
    }
}

pub(crate) fn parse_failure(file_key: &str, reason: impl Into<String>) -> ParseFailure {
    ParseFailure {
        path: file_key.to_string(),
        reason: reason.into(),
    }
}
