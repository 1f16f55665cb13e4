//! Intent documents: declared expectations parsed out of markdown.
//!
//! A document declares collections of entries inside fenced ```json blocks:
//!
//! ```json
//! {
//!   "flows": [
//!     {"id": "flow.auth-login", "name": "Login", "ref": "auth.login",
//!      "required": true, "covers": ["function.src/auth.rs:login"]}
//!   ]
//! }
//! ```
//!
//! Collection names are plural kind tags; unknown collections become
//! custom kinds so teams can declare their own vocabulary. Malformed
//! entries are skipped with a warning and never abort the document.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::common::{content_hash, now_unix};
use crate::error::SextantError;
use crate::graph::{EdgeKind, EdgeRow, GraphStore, Layer, NodeKind, NodeRow};

/// One declared expectation.
#[derive(Debug, Clone)]
pub struct IntentEntry {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Target artifact this intent points at (node id or logical name)
    pub reference: Option<String>,
    pub required: bool,
    /// Code node ids this intent claims coverage of
    pub covers: Vec<String>,
    /// Other intent entry ids this one depends on
    pub depends: Vec<String>,
    /// Hash of the entry's JSON, for change detection
    pub raw_hash: String,
}

/// Non-fatal problem found while parsing a document.
#[derive(Debug, Clone, Serialize)]
pub struct IntentWarning {
    pub document: String,
    pub reason: String,
}

/// Result of loading one document into the store.
#[derive(Debug, Serialize)]
pub struct IntentLoadOutcome {
    pub document: String,
    pub entries: usize,
    pub warnings: Vec<IntentWarning>,
}

/// Whether a path should go through the intent parser.
pub fn is_intent_document(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

/// Parse declared entries out of a markdown document.
///
/// # Behavior
/// Every fenced ```json block is read as an object of collection arrays.
/// Blocks that fail to parse, collections that are not arrays, and entries
/// missing `id` or `name` each produce a warning; everything else loads.
pub fn parse_document(doc_key: &str, markdown: &str) -> (Vec<IntentEntry>, Vec<IntentWarning>) {
    let mut entries = Vec::new();
    let mut warnings = Vec::new();

    for block in json_blocks(markdown) {
        let value: Value = match serde_json::from_str(&block) {
            Ok(v) => v,
            Err(e) => {
                warnings.push(IntentWarning {
                    document: doc_key.to_string(),
                    reason: format!("unparseable json block: {e}"),
                });
                continue;
            }
        };
        let Value::Object(collections) = value else {
            warnings.push(IntentWarning {
                document: doc_key.to_string(),
                reason: "json block is not an object of collections".to_string(),
            });
            continue;
        };
        for (collection, items) in collections {
            let Value::Array(items) = items else {
                warnings.push(IntentWarning {
                    document: doc_key.to_string(),
                    reason: format!("collection '{collection}' is not an array"),
                });
                continue;
            };
            let default_kind = collection_kind(&collection);
            for item in items {
                match parse_entry(&item, &default_kind, doc_key) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => warnings.push(IntentWarning {
                        document: doc_key.to_string(),
                        reason: err.to_string(),
                    }),
                }
            }
        }
    }
    (entries, warnings)
}

/// Parse a document and replace its declarations in the store.
///
/// # Guarantees
/// - Document-scoped: other documents' entries are untouched.
/// - `last_validated` is carried forward for entries whose JSON did not
///   change, and reset to now for edited or new entries.
pub fn load_document(
    store: &mut GraphStore,
    project: &str,
    doc_key: &str,
    markdown: &str,
) -> Result<IntentLoadOutcome> {
    let (entries, warnings) = parse_document(doc_key, markdown);
    let now = now_unix();

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for entry in &entries {
        let last_validated = match store.get_node(project, &entry.id)? {
            Some(existing) if existing.content_hash.as_deref() == Some(entry.raw_hash.as_str()) => {
                existing.last_validated
            }
            _ => Some(now),
        };
        nodes.push(NodeRow {
            id: entry.id.clone(),
            project: project.to_string(),
            layer: Layer::Intent.as_str().to_string(),
            kind: entry.kind.as_str().to_string(),
            name: entry.name.clone(),
            file_path: Some(doc_key.to_string()),
            line_start: None,
            line_end: None,
            reference: entry.reference.clone(),
            signature: None,
            content_hash: Some(entry.raw_hash.clone()),
            required: entry.required,
            last_updated: now,
            last_validated,
        });
        for target in &entry.covers {
            edges.push(intent_edge(project, &entry.id, target, EdgeKind::Covers, doc_key));
        }
        for target in &entry.depends {
            edges.push(intent_edge(project, &entry.id, target, EdgeKind::Depends, doc_key));
        }
    }

    store.replace_intent_document(project, doc_key, &nodes, &edges)?;
    Ok(IntentLoadOutcome {
        document: doc_key.to_string(),
        entries: entries.len(),
        warnings,
    })
}

fn intent_edge(
    project: &str,
    from_id: &str,
    to_id: &str,
    kind: EdgeKind,
    doc_key: &str,
) -> EdgeRow {
    EdgeRow {
        project: project.to_string(),
        from_id: from_id.to_string(),
        to_id: to_id.to_string(),
        kind: kind.as_str().to_string(),
        confidence: 1.0,
        line_number: None,
        file_path: Some(doc_key.to_string()),
        dangling: false,
        dangling_passes: 0,
    }
}

fn parse_entry(
    item: &Value,
    default_kind: &NodeKind,
    doc_key: &str,
) -> Result<IntentEntry, SextantError> {
    let malformed = |reason: String| SextantError::MalformedIntentEntry {
        document: doc_key.to_string(),
        reason,
    };
    let Value::Object(fields) = item else {
        return Err(malformed("entry is not an object".to_string()));
    };
    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("entry missing 'id': {item}")))?;
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("entry '{id}' missing 'name'")))?;
    let kind = fields
        .get("kind")
        .and_then(Value::as_str)
        .map(NodeKind::parse)
        .unwrap_or_else(|| default_kind.clone());
    Ok(IntentEntry {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        reference: fields
            .get("ref")
            .and_then(Value::as_str)
            .map(str::to_string),
        required: fields
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        covers: string_list(fields.get("covers")),
        depends: string_list(fields.get("depends")),
        raw_hash: content_hash(item.to_string().as_bytes()),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Map a plural collection name to a node kind.
fn collection_kind(collection: &str) -> NodeKind {
    NodeKind::parse(&singular(collection))
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if word.len() > 1 {
        word.strip_suffix('s').unwrap_or(word).to_string()
    } else {
        word.to_string()
    }
}

/// Contents of every fenced ```json block, in document order.
fn json_blocks(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    let mut in_other_fence = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(buf) = current.as_mut() {
            if trimmed.starts_with("```") {
                blocks.push(current.take().unwrap_or_default());
            } else {
                buf.push_str(line);
                buf.push('\n');
            }
        } else if in_other_fence {
            if trimmed.starts_with("```") {
                in_other_fence = false;
            }
        } else if trimmed == "```json" {
            current = Some(String::new());
        } else if trimmed.starts_with("```") {
            in_other_fence = true;
        }
    }
    blocks
}
