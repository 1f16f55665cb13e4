//! Error taxonomy for sextant
//!
//! Typed errors are used where callers branch on the variant (lock conflicts,
//! missing projects, empty graphs). Orchestration code uses anyhow and wraps
//! these with context.

/// Errors surfaced by store and query operations.
#[derive(Debug, thiserror::Error)]
pub enum SextantError {
    /// Operation on a project that was never registered (no sync has run).
    #[error("project not found: {0} (run `sextant sync` to register it)")]
    ProjectNotFound(String),

    /// A query ran against a project with no graph data yet.
    ///
    /// Recoverable precondition error, not a crash: the remediation is to
    /// run a sync pass first.
    #[error("graph for project '{0}' is empty; run `sextant sync` first")]
    GraphEmpty(String),

    /// Another sync pass currently holds the write lock for this project.
    ///
    /// Callers should retry with backoff. This is not data corruption.
    #[error("project '{0}' is already syncing; retry later")]
    ConcurrentSyncConflict(String),

    /// An intent list entry is missing a required field.
    ///
    /// Per-entry: the entry is skipped with a warning, the rest of the
    /// document still loads.
    #[error("malformed intent entry in {document}: {reason}")]
    MalformedIntentEntry { document: String, reason: String },
}

/// Soft per-file extraction failure recorded in a sync report.
///
/// Never propagated past the extractor boundary: the file's previous
/// nodes/edges stay in place until a successful re-parse.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParseFailure {
    /// File that failed to parse
    pub path: String,
    /// Human-readable failure reason (syntax error, timeout, encoding)
    pub reason: String,
}
