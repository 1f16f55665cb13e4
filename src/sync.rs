//! Sync pass: walk a source tree, re-extract what changed, merge it in.
//!
//! The walk is deterministic (sorted, gitignore-aware). Extraction of
//! changed files fans out across worker threads; merges are serialized in
//! path order under the project write lock, so the delete-then-insert
//! discipline never interleaves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::common::{content_hash, now_unix, relative_key};
use crate::error::ParseFailure;
use crate::graph::{EdgeRow, GraphStore, Layer, LedgerDecision, NodeRow};
use crate::ingest::{self, Extraction, Language};
use crate::intent::{self, IntentWarning};

/// Default per-file parse budget: five seconds.
pub const DEFAULT_PARSE_TIMEOUT_MICROS: u64 = 5_000_000;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Ignore the hash ledger and reprocess every file
    pub full: bool,
    pub parse_timeout_micros: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            full: false,
            parse_timeout_micros: DEFAULT_PARSE_TIMEOUT_MICROS,
        }
    }
}

/// What one sync pass did.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_unsupported: usize,
    pub files_removed: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub intent_documents: usize,
    pub intent_warnings: Vec<IntentWarning>,
    /// Soft failures: previous graph rows for these files were kept
    pub parse_failures: Vec<ParseFailure>,
    /// Unreadable files; a non-empty list should fail the invocation
    pub hard_failures: Vec<ParseFailure>,
    pub duration_ms: u64,
}

enum FileClass {
    Code(Language),
    Intent,
    Other,
}

fn classify(path: &Path) -> FileClass {
    if let Some(lang) = Language::from_path(path) {
        FileClass::Code(lang)
    } else if intent::is_intent_document(path) {
        FileClass::Intent
    } else {
        FileClass::Other
    }
}

/// Run one sync pass for a project.
///
/// # Behavior
/// - Acquires the single-writer lock; a concurrent pass is an error.
/// - Walks `root` respecting ignore files, in sorted order.
/// - Skips files whose ledger hash is unchanged (unless `full`).
/// - Extracts changed code files in parallel, merges serially per file.
/// - Loads changed markdown documents through the intent parser.
/// - Removes graph state for files that disappeared from the tree.
/// - On a full pass, reconciles dangling markers and applies retention.
pub fn sync_project(
    store: &mut GraphStore,
    project: &str,
    root: &Path,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let started = Instant::now();
    let _guard = store.lock_project(project)?;
    let root_display = root.to_string_lossy().to_string();
    store.register_project(project, &root_display)?;

    let mut report = SyncReport::default();
    let files = walk_tree(root)?;

    // (key, language, source) for files that need re-extraction
    let mut to_extract: Vec<(String, Language, String)> = Vec::new();
    // (key, markdown) for intent documents that changed
    let mut intent_docs: Vec<(String, String)> = Vec::new();
    // hashes for everything we will commit this pass
    let mut hashes: BTreeMap<String, String> = BTreeMap::new();

    for (key, path) in &files {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.hard_failures.push(ParseFailure {
                    path: key.clone(),
                    reason: format!("read failed: {e}"),
                });
                continue;
            }
        };
        let hash = content_hash(&bytes);
        match store.ledger_decision(project, key, &hash, options.full)? {
            LedgerDecision::Skip => {
                store.refresh_file_record(project, key)?;
                report.files_skipped += 1;
                continue;
            }
            LedgerDecision::Reprocess => {}
        }
        hashes.insert(key.clone(), hash);
        match classify(path) {
            FileClass::Code(lang) => match String::from_utf8(bytes) {
                Ok(source) => to_extract.push((key.clone(), lang, source)),
                Err(_) => report.parse_failures.push(ParseFailure {
                    path: key.clone(),
                    reason: "not valid utf-8".to_string(),
                }),
            },
            FileClass::Intent => match String::from_utf8(bytes) {
                Ok(markdown) => intent_docs.push((key.clone(), markdown)),
                Err(_) => report.parse_failures.push(ParseFailure {
                    path: key.clone(),
                    reason: "not valid utf-8".to_string(),
                }),
            },
            FileClass::Other => {
                let hash = hashes[key].clone();
                store.touch_file_record(project, key, &hash, 0, 0)?;
                report.files_unsupported += 1;
            }
        }
    }

    // Extraction is pure, so it fans out; merges stay in path order
    let timeout = options.parse_timeout_micros;
    let extracted: Vec<(String, Result<Extraction, ParseFailure>)> = to_extract
        .par_iter()
        .map(|(key, lang, source)| (key.clone(), ingest::extract_source(*lang, key, source, timeout)))
        .collect();

    for (key, result) in extracted {
        match result {
            Ok(extraction) => {
                let (nodes, edges) = attribute(project, &key, &extraction);
                let outcome = store.merge_file(project, &key, &hashes[&key], &nodes, &edges)?;
                report.files_processed += 1;
                report.nodes_written += outcome.nodes_written;
                report.edges_written += outcome.edges_written;
            }
            Err(failure) => {
                // Previous rows for this file stay until a clean re-parse
                report.parse_failures.push(failure);
            }
        }
    }

    for (key, markdown) in intent_docs {
        let outcome = intent::load_document(store, project, &key, &markdown)
            .with_context(|| format!("failed to load intent document {key}"))?;
        store.touch_file_record(project, &key, &hashes[&key], outcome.entries as i64, 0)?;
        report.files_processed += 1;
        report.intent_documents += 1;
        report.intent_warnings.extend(outcome.warnings);
    }

    // Ledger rows with no file behind them: the file was deleted
    let present: BTreeMap<&str, ()> = files.iter().map(|(k, _)| (k.as_str(), ())).collect();
    let stale: Vec<String> = store
        .list_file_records(project)?
        .into_iter()
        .filter(|r| !present.contains_key(r.path.as_str()))
        .map(|r| r.path)
        .collect();
    for path in stale {
        store.remove_file(project, &path)?;
        report.files_removed += 1;
    }

    if options.full {
        store.reconcile_dangling(project)?;
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

/// Deterministic, ignore-aware file walk. Returns (relative key, path)
/// pairs sorted by key.
fn walk_tree(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();
    for entry in walker {
        let entry = entry.with_context(|| format!("walk failed under {}", root.display()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            let path = entry.into_path();
            files.push((relative_key(&path, root), path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Attach project and provenance to an extraction's rows.
fn attribute(project: &str, file_key: &str, extraction: &Extraction) -> (Vec<NodeRow>, Vec<EdgeRow>) {
    let now = now_unix();
    let nodes = extraction
        .nodes
        .iter()
        .map(|n| NodeRow {
            id: n.id.clone(),
            project: project.to_string(),
            layer: Layer::Reality.as_str().to_string(),
            kind: n.kind.as_str().to_string(),
            name: n.name.clone(),
            file_path: Some(file_key.to_string()),
            line_start: Some(n.line_start),
            line_end: Some(n.line_end),
            reference: None,
            signature: n.signature.clone(),
            content_hash: Some(n.content_hash.clone()),
            required: false,
            last_updated: now,
            last_validated: None,
        })
        .collect();
    let edges = extraction
        .edges
        .iter()
        .map(|e| EdgeRow {
            project: project.to_string(),
            from_id: e.from_id.clone(),
            to_id: e.to_id.clone(),
            kind: e.kind.as_str().to_string(),
            confidence: e.confidence,
            line_number: e.line_number,
            file_path: Some(file_key.to_string()),
            dangling: false,
            dangling_passes: 0,
        })
        .collect();
    (nodes, edges)
}
