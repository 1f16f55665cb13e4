//! Per-file graph merges.
//!
//! The unit of consistency is one file: each merge deletes everything
//! previously attributed to the file, inserts the fresh extraction, and
//! commits the ledger row, all in a single transaction. Edges whose far
//! endpoint lives in another file are never deleted on that endpoint's
//! behalf; they are marked dangling until the endpoint reappears.

use ahash::AHashMap;
use anyhow::Result;
use rusqlite::{params, Connection, Transaction};

use crate::graph::ledger;
use crate::graph::registry;
use crate::graph::schema::{EdgeRow, Layer, NodeRow};
use crate::graph::RetentionPolicy;

/// Counters from one merge transaction.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MergeOutcome {
    pub nodes_removed: usize,
    pub edges_removed: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
}

/// Merge one file's extraction into the reality layer.
///
/// Nodes whose `content_hash` matches the row being replaced keep their
/// previous `last_updated`, so reprocessing an untouched file (a full pass)
/// does not register as an edit.
pub fn merge_file(
    conn: &mut Connection,
    project: &str,
    path: &str,
    file_hash: &str,
    nodes: &[NodeRow],
    edges: &[EdgeRow],
) -> Result<MergeOutcome> {
    let tx = conn.transaction()?;
    let prior = prior_timestamps(&tx, project, path)?;
    let mut outcome = delete_file_rows(&tx, project, path, Layer::Reality)?;
    let nodes: Vec<NodeRow> = nodes
        .iter()
        .map(|n| match prior.get(&n.id) {
            Some((hash, kept)) if hash.is_some() && *hash == n.content_hash => {
                let mut node = n.clone();
                node.last_updated = *kept;
                node
            }
            _ => n.clone(),
        })
        .collect();
    insert_rows(&tx, project, &nodes, edges, &mut outcome)?;
    update_dangling_markers(&tx, project)?;
    ledger::commit_file_record(
        &tx,
        project,
        path,
        file_hash,
        nodes.len() as i64,
        edges.len() as i64,
    )?;
    tx.commit()?;
    Ok(outcome)
}

/// Remove a file and everything attributed to it, including its ledger row.
/// Layer-agnostic: deleting an intent document drops its declarations too.
pub fn remove_file(conn: &mut Connection, project: &str, path: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM nodes WHERE project = ?1 AND file_path = ?2",
        params![project, path],
    )?;
    tx.execute(
        "DELETE FROM edges WHERE project = ?1 AND file_path = ?2",
        params![project, path],
    )?;
    tx.execute(
        "DELETE FROM file_records WHERE project = ?1 AND path = ?2",
        params![project, path],
    )?;
    update_dangling_markers(&tx, project)?;
    tx.commit()?;
    Ok(())
}

/// Replace one intent document's declarations.
///
/// Document-scoped like file merges: entries dropped from the document are
/// deleted, entries added appear, other documents are untouched. The
/// caller is responsible for carrying `last_validated` forward on unchanged
/// entries before calling this.
pub fn replace_intent_document(
    conn: &mut Connection,
    project: &str,
    doc_path: &str,
    nodes: &[NodeRow],
    edges: &[EdgeRow],
) -> Result<MergeOutcome> {
    let tx = conn.transaction()?;
    let mut outcome = delete_file_rows(&tx, project, doc_path, Layer::Intent)?;
    insert_rows(&tx, project, nodes, edges, &mut outcome)?;
    update_dangling_markers(&tx, project)?;
    tx.commit()?;
    Ok(outcome)
}

/// End-of-full-pass reconciliation.
///
/// Recomputes dangling markers project-wide, ages surviving dangling edges
/// by one pass, and applies the retention policy. Returns the number of
/// expired edges.
pub fn reconcile_dangling(
    conn: &mut Connection,
    project: &str,
    retention: RetentionPolicy,
) -> Result<usize> {
    let tx = conn.transaction()?;
    update_dangling_markers(&tx, project)?;
    tx.execute(
        "UPDATE edges SET dangling_passes = dangling_passes + 1
         WHERE project = ?1 AND dangling = 1",
        params![project],
    )?;
    let expired = match retention {
        RetentionPolicy::Persist => 0,
        RetentionPolicy::ExpireAfterPasses(max) => tx.execute(
            "DELETE FROM edges WHERE project = ?1 AND dangling = 1 AND dangling_passes > ?2",
            params![project, max as i64],
        )?,
    };
    tx.commit()?;
    Ok(expired)
}

/// Drop all graph and ledger state for a project. Access history survives.
pub fn clear_project(conn: &mut Connection, project: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM edges WHERE project = ?1", params![project])?;
    tx.execute("DELETE FROM nodes WHERE project = ?1", params![project])?;
    tx.execute(
        "DELETE FROM file_records WHERE project = ?1",
        params![project],
    )?;
    tx.commit()?;
    Ok(())
}

/// Timestamps and hashes of the rows a merge is about to replace.
fn prior_timestamps(
    tx: &Transaction<'_>,
    project: &str,
    path: &str,
) -> Result<AHashMap<String, (Option<String>, i64)>> {
    let mut stmt = tx.prepare(
        "SELECT id, content_hash, last_updated FROM nodes
         WHERE project = ?1 AND file_path = ?2 AND layer = 'reality'",
    )?;
    let rows = stmt.query_map(params![project, path], |row| {
        Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get(2)?)))
    })?;
    let mut prior = AHashMap::new();
    for row in rows {
        let (id, entry) = row?;
        prior.insert(id, entry);
    }
    Ok(prior)
}

fn delete_file_rows(
    tx: &Transaction<'_>,
    project: &str,
    path: &str,
    layer: Layer,
) -> Result<MergeOutcome> {
    let nodes_removed = tx.execute(
        "DELETE FROM nodes WHERE project = ?1 AND file_path = ?2 AND layer = ?3",
        params![project, path, layer.as_str()],
    )?;
    // Edges are attributed by provenance file, not by endpoint. Edges from
    // other files into this one stay behind and pick up the dangling marker.
    let edges_removed = tx.execute(
        "DELETE FROM edges WHERE project = ?1 AND file_path = ?2",
        params![project, path],
    )?;
    Ok(MergeOutcome {
        nodes_removed,
        edges_removed,
        ..Default::default()
    })
}

fn insert_rows(
    tx: &Transaction<'_>,
    project: &str,
    nodes: &[NodeRow],
    edges: &[EdgeRow],
    outcome: &mut MergeOutcome,
) -> Result<()> {
    for node in nodes {
        registry::register_node_kind(tx, &node.kind)?;
        tx.execute(
            "INSERT INTO nodes (id, project, layer, kind, name, file_path, line_start, line_end,
                                ref, signature, content_hash, required, last_updated, last_validated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(project, id) DO UPDATE SET
                 layer = excluded.layer,
                 kind = excluded.kind,
                 name = excluded.name,
                 file_path = excluded.file_path,
                 line_start = excluded.line_start,
                 line_end = excluded.line_end,
                 ref = excluded.ref,
                 signature = excluded.signature,
                 content_hash = excluded.content_hash,
                 required = excluded.required,
                 last_updated = excluded.last_updated,
                 last_validated = excluded.last_validated",
            params![
                node.id,
                project,
                node.layer,
                node.kind,
                node.name,
                node.file_path,
                node.line_start,
                node.line_end,
                node.reference,
                node.signature,
                node.content_hash,
                node.required as i64,
                node.last_updated,
                node.last_validated,
            ],
        )?;
        outcome.nodes_written += 1;
    }
    for edge in edges {
        registry::register_edge_kind(tx, &edge.kind)?;
        tx.execute(
            "INSERT INTO edges (project, from_id, to_id, kind, confidence, line_number,
                                file_path, dangling, dangling_passes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)
             ON CONFLICT(project, from_id, to_id, kind) DO UPDATE SET
                 confidence = excluded.confidence,
                 line_number = excluded.line_number,
                 file_path = excluded.file_path,
                 dangling = 0,
                 dangling_passes = 0",
            params![
                project,
                edge.from_id,
                edge.to_id,
                edge.kind,
                edge.confidence,
                edge.line_number,
                edge.file_path,
            ],
        )?;
        outcome.edges_written += 1;
    }
    Ok(())
}

/// Recompute dangling markers for every edge in the project.
///
/// Resolved edges reset their pass counter; newly dangling edges start at
/// zero and age only during full-pass reconciliation.
fn update_dangling_markers(tx: &Transaction<'_>, project: &str) -> Result<()> {
    tx.execute(
        "UPDATE edges SET dangling = 0, dangling_passes = 0
         WHERE project = ?1 AND dangling = 1
           AND EXISTS (SELECT 1 FROM nodes n WHERE n.project = ?1 AND n.id = edges.from_id)
           AND EXISTS (SELECT 1 FROM nodes n WHERE n.project = ?1 AND n.id = edges.to_id)",
        params![project],
    )?;
    tx.execute(
        "UPDATE edges SET dangling = 1
         WHERE project = ?1 AND dangling = 0
           AND (NOT EXISTS (SELECT 1 FROM nodes n WHERE n.project = ?1 AND n.id = edges.from_id)
             OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.project = ?1 AND n.id = edges.to_id))",
        params![project],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::now_unix;
    use crate::graph::schema::SCHEMA_SQL;

    fn open_mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn
    }

    fn node(id: &str, file: &str) -> NodeRow {
        NodeRow {
            id: id.to_string(),
            project: "p".to_string(),
            layer: "reality".to_string(),
            kind: "function".to_string(),
            name: id.rsplit(':').next().unwrap_or(id).to_string(),
            file_path: Some(file.to_string()),
            line_start: Some(1),
            line_end: Some(5),
            reference: None,
            signature: None,
            content_hash: None,
            required: false,
            last_updated: now_unix(),
            last_validated: None,
        }
    }

    fn edge(from: &str, to: &str, file: &str) -> EdgeRow {
        EdgeRow {
            project: "p".to_string(),
            from_id: from.to_string(),
            to_id: to.to_string(),
            kind: "calls".to_string(),
            confidence: 1.0,
            line_number: Some(3),
            file_path: Some(file.to_string()),
            dangling: false,
            dangling_passes: 0,
        }
    }

    fn edge_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM edges WHERE project = 'p'", [], |r| {
            r.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_merge_is_delete_then_insert() {
        let mut conn = open_mem();
        let f = "src/a.rs";
        merge_file(
            &mut conn,
            "p",
            f,
            "h1",
            &[node("function.src/a.rs:f", f), node("function.src/a.rs:g", f)],
            &[edge("function.src/a.rs:f", "function.src/a.rs:g", f)],
        )
        .unwrap();

        // Second pass: g was removed from the file
        let out = merge_file(
            &mut conn,
            "p",
            f,
            "h2",
            &[node("function.src/a.rs:f", f)],
            &[],
        )
        .unwrap();
        assert_eq!(out.nodes_removed, 2);
        assert_eq!(out.nodes_written, 1);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes WHERE project = 'p'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(edge_count(&conn), 0);
    }

    #[test]
    fn test_cross_file_edge_dangles_instead_of_disappearing() {
        let mut conn = open_mem();
        merge_file(
            &mut conn,
            "p",
            "src/a.rs",
            "ha",
            &[node("function.src/a.rs:f", "src/a.rs")],
            &[],
        )
        .unwrap();
        // b.rs calls into a.rs
        merge_file(
            &mut conn,
            "p",
            "src/b.rs",
            "hb",
            &[node("function.src/b.rs:h", "src/b.rs")],
            &[edge("function.src/b.rs:h", "function.src/a.rs:f", "src/b.rs")],
        )
        .unwrap();

        // a.rs loses f; b's edge must survive, marked dangling
        merge_file(&mut conn, "p", "src/a.rs", "ha2", &[], &[]).unwrap();
        let (dangling, passes): (i64, i64) = conn
            .query_row(
                "SELECT dangling, dangling_passes FROM edges WHERE project = 'p'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(dangling, 1);
        assert_eq!(passes, 0);

        // f comes back; the marker clears
        merge_file(
            &mut conn,
            "p",
            "src/a.rs",
            "ha3",
            &[node("function.src/a.rs:f", "src/a.rs")],
            &[],
        )
        .unwrap();
        let dangling: i64 = conn
            .query_row("SELECT dangling FROM edges WHERE project = 'p'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(dangling, 0);
    }

    #[test]
    fn test_remove_file_drops_ledger_row() {
        let mut conn = open_mem();
        merge_file(
            &mut conn,
            "p",
            "src/a.rs",
            "ha",
            &[node("function.src/a.rs:f", "src/a.rs")],
            &[],
        )
        .unwrap();
        remove_file(&mut conn, "p", "src/a.rs").unwrap();
        let records: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM file_records WHERE project = 'p'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(records, 0);
    }

    #[test]
    fn test_retention_expires_aged_dangling_edges() {
        let mut conn = open_mem();
        merge_file(
            &mut conn,
            "p",
            "src/b.rs",
            "hb",
            &[node("function.src/b.rs:h", "src/b.rs")],
            &[edge("function.src/b.rs:h", "function.src/a.rs:gone", "src/b.rs")],
        )
        .unwrap();

        // Persist keeps it no matter how many passes age it
        for _ in 0..3 {
            reconcile_dangling(&mut conn, "p", RetentionPolicy::Persist).unwrap();
        }
        assert_eq!(edge_count(&conn), 1);

        // dangling_passes is now 3; expiry threshold 2 deletes it
        let expired =
            reconcile_dangling(&mut conn, "p", RetentionPolicy::ExpireAfterPasses(2)).unwrap();
        assert_eq!(expired, 1);
        assert_eq!(edge_count(&conn), 0);
    }

    #[test]
    fn test_unchanged_content_keeps_last_updated() {
        let mut conn = open_mem();
        let mut first = node("function.src/a.rs:f", "src/a.rs");
        first.content_hash = Some("c1".to_string());
        first.last_updated = 100;
        merge_file(&mut conn, "p", "src/a.rs", "h1", &[first.clone()], &[]).unwrap();

        // Reprocessed without an edit: timestamp survives
        let mut again = first.clone();
        again.last_updated = 200;
        merge_file(&mut conn, "p", "src/a.rs", "h1", &[again], &[]).unwrap();
        let ts: i64 = conn
            .query_row(
                "SELECT last_updated FROM nodes WHERE id = 'function.src/a.rs:f'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(ts, 100);

        // A real edit restamps
        let mut edited = first;
        edited.content_hash = Some("c2".to_string());
        edited.last_updated = 300;
        merge_file(&mut conn, "p", "src/a.rs", "h2", &[edited], &[]).unwrap();
        let ts: i64 = conn
            .query_row(
                "SELECT last_updated FROM nodes WHERE id = 'function.src/a.rs:f'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(ts, 300);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut conn = open_mem();
        let nodes = [node("function.src/a.rs:f", "src/a.rs")];
        let edges = [edge("function.src/a.rs:f", "function.src/a.rs:f2", "src/a.rs")];
        merge_file(&mut conn, "p", "src/a.rs", "h", &nodes, &edges).unwrap();
        let first: Vec<(String, i64)> = {
            let mut stmt = conn
                .prepare("SELECT id, last_updated FROM nodes ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                .unwrap()
                .map(Result::unwrap)
                .collect()
        };
        merge_file(&mut conn, "p", "src/a.rs", "h", &nodes, &edges).unwrap();
        let second: Vec<(String, i64)> = {
            let mut stmt = conn
                .prepare("SELECT id, last_updated FROM nodes ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                .unwrap()
                .map(Result::unwrap)
                .collect()
        };
        assert_eq!(first.len(), second.len());
        assert_eq!(
            first.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            second.iter().map(|(id, _)| id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_intent_replace_is_document_scoped() {
        let mut conn = open_mem();
        let mut flow = node("flow.auth-login", "docs/intent.md");
        flow.layer = "intent".to_string();
        flow.kind = "flow".to_string();
        let mut api = node("api.login", "docs/other.md");
        api.layer = "intent".to_string();
        api.kind = "api".to_string();

        replace_intent_document(&mut conn, "p", "docs/intent.md", &[flow.clone()], &[]).unwrap();
        replace_intent_document(&mut conn, "p", "docs/other.md", &[api], &[]).unwrap();

        // Re-loading intent.md with nothing must not touch other.md
        replace_intent_document(&mut conn, "p", "docs/intent.md", &[], &[]).unwrap();
        let remaining: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT id FROM nodes WHERE layer = 'intent' ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| r.get(0))
                .unwrap()
                .map(Result::unwrap)
                .collect()
        };
        assert_eq!(remaining, vec!["api.login".to_string()]);
    }
}
