//! Graph schema definitions for sextant
//!
//! Row types for the relational store plus the open-ended node/edge kind
//! model. Intent and reality nodes share one table, distinguished by the
//! `layer` tag.

use serde::{Deserialize, Serialize};

/// SQL schema for the store. Executed on open; idempotent.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS projects (
    name        TEXT PRIMARY KEY,
    root        TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id             TEXT NOT NULL,
    project        TEXT NOT NULL,
    layer          TEXT NOT NULL DEFAULT 'reality',
    kind           TEXT NOT NULL,
    name           TEXT NOT NULL,
    file_path      TEXT,
    line_start     INTEGER,
    line_end       INTEGER,
    ref            TEXT,
    signature      TEXT,
    content_hash   TEXT,
    required       INTEGER NOT NULL DEFAULT 0,
    last_updated   INTEGER NOT NULL,
    last_validated INTEGER,
    PRIMARY KEY (project, id)
);
CREATE INDEX IF NOT EXISTS idx_nodes_project ON nodes(project);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(project, kind);
CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(project, file_path);
CREATE INDEX IF NOT EXISTS idx_nodes_layer ON nodes(project, layer);

CREATE TABLE IF NOT EXISTS edges (
    project        TEXT NOT NULL,
    from_id        TEXT NOT NULL,
    to_id          TEXT NOT NULL,
    kind           TEXT NOT NULL,
    confidence     REAL NOT NULL DEFAULT 1.0,
    line_number    INTEGER,
    file_path      TEXT,
    dangling       INTEGER NOT NULL DEFAULT 0,
    dangling_passes INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project, from_id, to_id, kind)
);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(project, from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(project, to_id);
CREATE INDEX IF NOT EXISTS idx_edges_file ON edges(project, file_path);

CREATE TABLE IF NOT EXISTS file_records (
    project      TEXT NOT NULL,
    path         TEXT NOT NULL,
    hash         TEXT NOT NULL,
    node_count   INTEGER NOT NULL,
    edge_count   INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    PRIMARY KEY (project, path)
);

CREATE TABLE IF NOT EXISTS node_kind_registry (
    kind    TEXT PRIMARY KEY,
    builtin INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS edge_kind_registry (
    kind    TEXT PRIMARY KEY,
    builtin INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS access_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    project     TEXT NOT NULL,
    node_id     TEXT NOT NULL,
    agent       TEXT NOT NULL,
    access_type TEXT NOT NULL DEFAULT 'read',
    accessed_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_access_project ON access_events(project);
CREATE INDEX IF NOT EXISTS idx_access_node ON access_events(project, node_id);
CREATE INDEX IF NOT EXISTS idx_access_time ON access_events(accessed_at);
";

/// Graph layer a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Derived from source code by an extractor
    Reality,
    /// Declared in an intent document
    Intent,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Reality => "reality",
            Layer::Intent => "intent",
        }
    }

    pub fn parse(s: &str) -> Layer {
        match s {
            "intent" => Layer::Intent,
            _ => Layer::Reality,
        }
    }
}

/// Node kind: well-known variants plus an open `Custom` fallback.
///
/// New kinds flow through the registry table without store or comparator
/// changes; built-ins keep static-typing benefits where the code branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Module,
    TypeAlias,
    Constant,
    Api,
    Flow,
    Domain,
    Page,
    Test,
    Doc,
    Custom(String),
}

impl NodeKind {
    /// Canonical string tag stored in the database.
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::File => "file",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Enum => "enum",
            NodeKind::Module => "module",
            NodeKind::TypeAlias => "type",
            NodeKind::Constant => "constant",
            NodeKind::Api => "api",
            NodeKind::Flow => "flow",
            NodeKind::Domain => "domain",
            NodeKind::Page => "page",
            NodeKind::Test => "test",
            NodeKind::Doc => "doc",
            NodeKind::Custom(s) => s,
        }
    }

    /// Parse a stored tag. Unknown tags become `Custom` (never an error).
    pub fn parse(s: &str) -> NodeKind {
        match s {
            "file" => NodeKind::File,
            "function" => NodeKind::Function,
            "method" => NodeKind::Method,
            "class" => NodeKind::Class,
            "interface" => NodeKind::Interface,
            "enum" => NodeKind::Enum,
            "module" => NodeKind::Module,
            "type" => NodeKind::TypeAlias,
            "constant" => NodeKind::Constant,
            "api" => NodeKind::Api,
            "flow" => NodeKind::Flow,
            "domain" => NodeKind::Domain,
            "page" => NodeKind::Page,
            "test" => NodeKind::Test,
            "doc" => NodeKind::Doc,
            other => NodeKind::Custom(other.to_string()),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, NodeKind::Custom(_))
    }
}

/// Edge kind: well-known variants plus an open `Custom` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
    Extends,
    Implements,
    Uses,
    Covers,
    Depends,
    Custom(String),
}

impl EdgeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Imports => "imports",
            EdgeKind::Calls => "calls",
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
            EdgeKind::Uses => "uses",
            EdgeKind::Covers => "covers",
            EdgeKind::Depends => "depends",
            EdgeKind::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> EdgeKind {
        match s {
            "contains" => EdgeKind::Contains,
            "imports" => EdgeKind::Imports,
            "calls" => EdgeKind::Calls,
            "extends" => EdgeKind::Extends,
            "implements" => EdgeKind::Implements,
            "uses" => EdgeKind::Uses,
            "covers" => EdgeKind::Covers,
            "depends" => EdgeKind::Depends,
            other => EdgeKind::Custom(other.to_string()),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, EdgeKind::Custom(_))
    }
}

/// Node row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: String,
    pub project: String,
    /// "reality" or "intent"
    pub layer: String,
    pub kind: String,
    pub name: String,
    pub file_path: Option<String>,
    pub line_start: Option<i64>,
    pub line_end: Option<i64>,
    /// Intent nodes: declared target artifact (e.g. "auth.login")
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub signature: Option<String>,
    pub content_hash: Option<String>,
    pub required: bool,
    /// Unix seconds when this row was last written
    pub last_updated: i64,
    /// Unix seconds when the declared intent was last confirmed against code
    pub last_validated: Option<i64>,
}

/// Edge row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRow {
    pub project: String,
    pub from_id: String,
    pub to_id: String,
    pub kind: String,
    /// (0,1]; extractors emit <1.0 for name-resolution guesses
    pub confidence: f64,
    pub line_number: Option<i64>,
    /// Provenance: file (or document) whose extraction emitted this edge
    pub file_path: Option<String>,
    /// Far endpoint missing from the current snapshot
    pub dangling: bool,
    /// Full passes this edge has stayed dangling (retention policy input)
    pub dangling_passes: i64,
}

/// Hash ledger row: source of truth for skip/reprocess decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub project: String,
    pub path: String,
    pub hash: String,
    pub node_count: i64,
    pub edge_count: i64,
    pub last_updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_round_trip() {
        for kind in [
            NodeKind::File,
            NodeKind::Function,
            NodeKind::Flow,
            NodeKind::Custom("widget".into()),
        ] {
            assert_eq!(NodeKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_unknown_kind_becomes_custom() {
        let k = NodeKind::parse("spaceship");
        assert_eq!(k, NodeKind::Custom("spaceship".into()));
        assert!(!k.is_builtin());
    }

    #[test]
    fn test_edge_kind_round_trip() {
        for kind in [EdgeKind::Contains, EdgeKind::Covers, EdgeKind::Custom("blames".into())] {
            assert_eq!(EdgeKind::parse(kind.as_str()), kind);
        }
    }
}
