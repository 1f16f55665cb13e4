//! Hash ledger: per-file fingerprints gating re-extraction.
//!
//! The ledger row, not the filesystem mtime, is the source of truth for
//! skip decisions. Rows are committed inside the same transaction as the
//! graph merge so hash and graph state cannot diverge across a crash.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::common::now_unix;
use crate::graph::schema::FileRecord;

/// Outcome of consulting the ledger for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDecision {
    /// Hash unchanged and not a full pass: reuse existing graph rows.
    Skip,
    /// New file, changed hash, or full pass: run extraction and merge.
    Reprocess,
}

/// Decide whether a file needs re-extraction.
///
/// # Behavior
/// A full pass always reprocesses. Otherwise a file is skipped only when a
/// ledger row exists and its stored hash equals `current_hash`.
pub fn decide(
    conn: &Connection,
    project: &str,
    path: &str,
    current_hash: &str,
    full: bool,
) -> Result<LedgerDecision> {
    if full {
        return Ok(LedgerDecision::Reprocess);
    }
    let stored: Option<String> = conn
        .query_row(
            "SELECT hash FROM file_records WHERE project = ?1 AND path = ?2",
            params![project, path],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        Some(hash) if hash == current_hash => Ok(LedgerDecision::Skip),
        _ => Ok(LedgerDecision::Reprocess),
    }
}

/// Upsert one ledger row. Runs inside the merge transaction when called
/// from the merge path.
pub fn commit_file_record(
    conn: &Connection,
    project: &str,
    path: &str,
    hash: &str,
    node_count: i64,
    edge_count: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO file_records (project, path, hash, node_count, edge_count, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(project, path) DO UPDATE SET
             hash = excluded.hash,
             node_count = excluded.node_count,
             edge_count = excluded.edge_count,
             last_updated = excluded.last_updated",
        params![project, path, hash, node_count, edge_count, now_unix()],
    )?;
    Ok(())
}

/// Refresh a ledger row's `last_updated` without touching hash or counts.
/// Called for files a pass skipped on an unchanged hash.
pub fn refresh_file_record(conn: &Connection, project: &str, path: &str) -> Result<()> {
    conn.execute(
        "UPDATE file_records SET last_updated = ?3 WHERE project = ?1 AND path = ?2",
        params![project, path, now_unix()],
    )?;
    Ok(())
}

pub fn get_file_record(conn: &Connection, project: &str, path: &str) -> Result<Option<FileRecord>> {
    let record = conn
        .query_row(
            "SELECT project, path, hash, node_count, edge_count, last_updated
             FROM file_records WHERE project = ?1 AND path = ?2",
            params![project, path],
            read_record,
        )
        .optional()?;
    Ok(record)
}

/// All ledger rows for a project, ordered by path.
pub fn list_file_records(conn: &Connection, project: &str) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(
        "SELECT project, path, hash, node_count, edge_count, last_updated
         FROM file_records WHERE project = ?1 ORDER BY path",
    )?;
    let rows = stmt.query_map(params![project], read_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        project: row.get(0)?,
        path: row.get(1)?,
        hash: row.get(2)?,
        node_count: row.get(3)?,
        edge_count: row.get(4)?,
        last_updated: row.get(5)?,
    })
}
