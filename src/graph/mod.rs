//! Graph persistence layer over SQLite
//!
//! One store holds both graphs: the reality layer (code-derived) and the
//! intent layer (declared), in shared `nodes`/`edges` tables tagged by
//! layer. All mutation goes through per-file transactions under a
//! per-project write lock; reads never block writes beyond SQLite's own
//! consistency guarantees.

mod access;
mod ledger;
mod merge;
mod query;
mod registry;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::common::now_unix;
use crate::error::SextantError;

pub use access::{AccessEvent, NodeTemperature};
pub use ledger::LedgerDecision;
pub use merge::MergeOutcome;
pub use query::{ImpactResult, ImpactedNode, Neighbor};
pub use schema::{EdgeKind, EdgeRow, FileRecord, Layer, NodeKind, NodeRow};

/// Schema version written by this build. Bumped on incompatible DDL changes.
pub const SEXTANT_SCHEMA_VERSION: i64 = 1;

/// What happens to edges that stay dangling across full passes.
///
/// Incremental merges only mark/unmark; expiry is applied during full
/// rebuild reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep dangling edges indefinitely (default)
    Persist,
    /// Delete edges that stayed dangling for more than N full passes
    ExpireAfterPasses(u32),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Persist
    }
}

/// In-process single-writer-per-project lock registry.
///
/// Shareable across store handles so that every component constructed from
/// the same registry observes the same write discipline. No global
/// singleton: tests create an isolated registry per case.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the write lock for a project.
    ///
    /// # Errors
    /// `ConcurrentSyncConflict` if another holder has the project locked.
    pub fn try_acquire(&self, project: &str) -> Result<ProjectLockGuard, SextantError> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !held.insert(project.to_string()) {
            return Err(SextantError::ConcurrentSyncConflict(project.to_string()));
        }
        Ok(ProjectLockGuard {
            project: project.to_string(),
            held: Arc::clone(&self.held),
        })
    }
}

/// RAII guard for a project write lock. Released on drop.
#[derive(Debug)]
pub struct ProjectLockGuard {
    project: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.project);
    }
}

/// Graph database handle.
///
/// Pass explicitly into every component that needs it; each test case opens
/// its own tempfile-backed instance.
pub struct GraphStore {
    conn: Connection,
    locks: ProjectLocks,
    retention: RetentionPolicy,
}

impl GraphStore {
    /// Open (creating if needed) a store at the given path.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::open_with_locks(db_path, ProjectLocks::new())
    }

    /// Open a store sharing an existing lock registry.
    ///
    /// Use when multiple handles in one process must observe the same
    /// single-writer-per-project discipline.
    pub fn open_with_locks<P: AsRef<Path>>(db_path: P, locks: ProjectLocks) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("failed to open store at {}", db_path.as_ref().display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(schema::SCHEMA_SQL)
            .context("failed to apply store schema")?;
        let store = Self {
            conn,
            locks,
            retention: RetentionPolicy::default(),
        };
        registry::seed_builtin_kinds(&store.conn)?;
        Ok(store)
    }

    /// Set the dangling-edge retention policy for this handle.
    pub fn set_retention_policy(&mut self, policy: RetentionPolicy) {
        self.retention = policy;
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention
    }

    /// Acquire the single-writer lock for a project.
    pub fn lock_project(&self, project: &str) -> Result<ProjectLockGuard, SextantError> {
        self.locks.try_acquire(project)
    }

    pub fn locks(&self) -> ProjectLocks {
        self.locks.clone()
    }

    // ===== Projects =====

    /// Register (or refresh) a project. Idempotent.
    pub fn register_project(&mut self, name: &str, root: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO projects (name, root, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET root = excluded.root",
            params![name, root, now_unix()],
        )?;
        Ok(())
    }

    /// All registered projects as (name, root), sorted by name.
    pub fn list_projects(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, root FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    pub fn project_root(&self, name: &str) -> Result<Option<String>> {
        let root = self
            .conn
            .query_row(
                "SELECT root FROM projects WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(root)
    }

    /// Fail with `ProjectNotFound` unless the project is registered.
    pub fn require_project(&self, name: &str) -> Result<(), SextantError> {
        match self.project_root(name) {
            Ok(Some(_)) => Ok(()),
            _ => Err(SextantError::ProjectNotFound(name.to_string())),
        }
    }

    /// Fail with `GraphEmpty` if the project has no nodes in either layer.
    pub fn require_nonempty(&self, project: &str) -> Result<(), SextantError> {
        self.require_project(project)?;
        let count = self.count_nodes(project, None).unwrap_or(0);
        if count == 0 {
            return Err(SextantError::GraphEmpty(project.to_string()));
        }
        Ok(())
    }

    // ===== Counts =====

    pub fn count_nodes(&self, project: &str, layer: Option<Layer>) -> Result<usize> {
        let count: i64 = match layer {
            Some(layer) => self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE project = ?1 AND layer = ?2",
                params![project, layer.as_str()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE project = ?1",
                params![project],
                |row| row.get(0),
            )?,
        };
        Ok(count as usize)
    }

    pub fn count_edges(&self, project: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE project = ?1",
            params![project],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_file_records(&self, project: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM file_records WHERE project = ?1",
            params![project],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ===== Node/edge reads =====

    pub fn get_node(&self, project: &str, id: &str) -> Result<Option<NodeRow>> {
        let node = self
            .conn
            .query_row(
                &format!("SELECT {} FROM nodes WHERE project = ?1 AND id = ?2", NODE_COLUMNS),
                params![project, id],
                read_node_row,
            )
            .optional()?;
        Ok(node)
    }

    /// List nodes, optionally filtered by layer and kind. Ordered by
    /// (kind, id) for deterministic output.
    pub fn list_nodes(
        &self,
        project: &str,
        layer: Option<Layer>,
        kind: Option<&NodeKind>,
    ) -> Result<Vec<NodeRow>> {
        let mut sql = format!("SELECT {} FROM nodes WHERE project = ?1", NODE_COLUMNS);
        let mut args: Vec<String> = vec![project.to_string()];
        if let Some(layer) = layer {
            sql.push_str(" AND layer = ?2");
            args.push(layer.as_str().to_string());
        }
        if let Some(kind) = kind {
            sql.push_str(&format!(" AND kind = ?{}", args.len() + 1));
            args.push(kind.as_str().to_string());
        }
        sql.push_str(" ORDER BY kind, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), read_node_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// All edges for a project, ordered deterministically.
    pub fn list_edges(&self, project: &str) -> Result<Vec<EdgeRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM edges WHERE project = ?1 ORDER BY from_id, to_id, kind",
            EDGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![project], read_edge_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    pub fn get_file_record(&self, project: &str, path: &str) -> Result<Option<FileRecord>> {
        ledger::get_file_record(&self.conn, project, path)
    }

    pub fn list_file_records(&self, project: &str) -> Result<Vec<FileRecord>> {
        ledger::list_file_records(&self.conn, project)
    }

    // ===== Hash ledger =====

    /// Decide whether a file needs re-extraction given its current hash.
    pub fn ledger_decision(
        &self,
        project: &str,
        path: &str,
        current_hash: &str,
        full: bool,
    ) -> Result<LedgerDecision> {
        ledger::decide(&self.conn, project, path, current_hash, full)
    }

    /// Refresh a skipped file's ledger timestamp; hash and counts stay as
    /// last committed.
    pub fn refresh_file_record(&mut self, project: &str, path: &str) -> Result<()> {
        ledger::refresh_file_record(&self.conn, project, path)
    }

    /// Upsert a ledger row outside a merge (unsupported files, intent
    /// documents).
    pub fn touch_file_record(
        &mut self,
        project: &str,
        path: &str,
        hash: &str,
        node_count: i64,
        edge_count: i64,
    ) -> Result<()> {
        ledger::commit_file_record(&self.conn, project, path, hash, node_count, edge_count)
    }

    // ===== Mutation (caller must hold the project lock) =====

    /// Merge one file's extraction into the reality graph.
    ///
    /// Delete-then-insert per file inside a single transaction; edges into
    /// other files are retained with the dangling marker. The ledger row is
    /// committed in the same transaction so a crash mid-sync cannot leave
    /// hash and graph inconsistent.
    pub fn merge_file(
        &mut self,
        project: &str,
        path: &str,
        file_hash: &str,
        nodes: &[NodeRow],
        edges: &[EdgeRow],
    ) -> Result<MergeOutcome> {
        merge::merge_file(&mut self.conn, project, path, file_hash, nodes, edges)
    }

    /// Remove a file and everything attributed to it.
    pub fn remove_file(&mut self, project: &str, path: &str) -> Result<()> {
        merge::remove_file(&mut self.conn, project, path)
    }

    /// Replace one intent document's nodes/edges.
    pub fn replace_intent_document(
        &mut self,
        project: &str,
        doc_path: &str,
        nodes: &[NodeRow],
        edges: &[EdgeRow],
    ) -> Result<MergeOutcome> {
        merge::replace_intent_document(&mut self.conn, project, doc_path, nodes, edges)
    }

    /// Reconcile dangling markers across the whole project and apply the
    /// retention policy. Runs at the end of a full pass.
    pub fn reconcile_dangling(&mut self, project: &str) -> Result<usize> {
        merge::reconcile_dangling(&mut self.conn, project, self.retention)
    }

    /// Drop all graph data for a project (full rebuild starts here).
    pub fn clear_project(&mut self, project: &str) -> Result<()> {
        merge::clear_project(&mut self.conn, project)
    }

    // ===== Queries =====

    /// Breadth-first neighbor expansion over both edge directions.
    pub fn neighbors(&self, project: &str, node_id: &str, depth: usize) -> Result<Vec<Neighbor>> {
        self.require_nonempty(project)?;
        query::neighbors(&self.conn, project, node_id, depth)
    }

    /// Reverse-edge transitive closure: who is affected if this changes.
    pub fn impact(&self, project: &str, node_id: &str) -> Result<ImpactResult> {
        self.require_nonempty(project)?;
        query::impact(&self.conn, project, node_id)
    }

    // ===== Access feed =====

    /// Record an access event from an external agent.
    pub fn record_access(
        &mut self,
        project: &str,
        node_id: &str,
        agent: &str,
        access_type: &str,
    ) -> Result<i64> {
        access::record_access(&self.conn, project, node_id, agent, access_type)
    }

    /// Nodes ranked by time-decayed access frequency within a window.
    pub fn hot_nodes(
        &self,
        project: &str,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NodeTemperature>> {
        self.require_nonempty(project)?;
        access::hot_nodes(&self.conn, project, window_days, limit)
    }

    /// Nodes with zero recorded accesses within the window.
    pub fn cold_nodes(&self, project: &str, window_days: i64) -> Result<Vec<NodeTemperature>> {
        self.require_nonempty(project)?;
        access::cold_nodes(&self.conn, project, window_days)
    }

    /// Recent access events, newest first.
    pub fn access_history(
        &self,
        project: &str,
        node_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AccessEvent>> {
        access::access_history(&self.conn, project, node_id, limit)
    }

    // ===== Registry =====

    pub fn registered_node_kinds(&self) -> Result<Vec<String>> {
        registry::list_node_kinds(&self.conn)
    }

    pub fn registered_edge_kinds(&self) -> Result<Vec<String>> {
        registry::list_edge_kinds(&self.conn)
    }
}

pub(crate) const NODE_COLUMNS: &str = "id, project, layer, kind, name, file_path, line_start, \
     line_end, ref, signature, content_hash, required, last_updated, last_validated";

pub(crate) const EDGE_COLUMNS: &str =
    "project, from_id, to_id, kind, confidence, line_number, file_path, dangling, dangling_passes";

pub(crate) fn read_node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: row.get(0)?,
        project: row.get(1)?,
        layer: row.get(2)?,
        kind: row.get(3)?,
        name: row.get(4)?,
        file_path: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        reference: row.get(8)?,
        signature: row.get(9)?,
        content_hash: row.get(10)?,
        required: row.get::<_, i64>(11)? != 0,
        last_updated: row.get(12)?,
        last_validated: row.get(13)?,
    })
}

pub(crate) fn read_edge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok(EdgeRow {
        project: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        kind: row.get(3)?,
        confidence: row.get(4)?,
        line_number: row.get(5)?,
        file_path: row.get(6)?,
        dangling: row.get::<_, i64>(7)? != 0,
        dangling_passes: row.get(8)?,
    })
}
