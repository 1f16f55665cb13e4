//! Access telemetry: who touches which nodes, and how recently.
//!
//! External agents report reads/edits against node ids; hot/cold queries
//! turn the event stream into a time-decayed attention ranking.

use ahash::AHashMap;
use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::common::now_unix;

/// Exponential decay half-life for hot scoring, in days. An access loses
/// half its weight every week.
const HALF_LIFE_DAYS: f64 = 7.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One recorded access.
#[derive(Debug, Clone, Serialize)]
pub struct AccessEvent {
    pub id: i64,
    pub node_id: String,
    pub agent: String,
    pub access_type: String,
    pub accessed_at: i64,
}

/// Hot/cold ranking entry.
#[derive(Debug, Clone, Serialize)]
pub struct NodeTemperature {
    pub node_id: String,
    pub kind: String,
    pub name: String,
    /// Time-decayed access weight (0.0 for cold listings)
    pub score: f64,
    /// Raw event count inside the window
    pub access_count: i64,
    pub last_accessed: Option<i64>,
}

/// Append one access event. Returns the event id.
///
/// Node ids are not validated against the graph: events may arrive for
/// nodes a later sync removes, and history is kept either way.
pub fn record_access(
    conn: &Connection,
    project: &str,
    node_id: &str,
    agent: &str,
    access_type: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO access_events (project, node_id, agent, access_type, accessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![project, node_id, agent, access_type, now_unix()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Nodes ranked by time-decayed access weight within the window.
///
/// Weight per event is `0.5 ^ (age_days / half_life)`, summed per node.
/// Events for node ids no longer in the graph are ignored. Ties break on
/// node id for stable output.
pub fn hot_nodes(
    conn: &Connection,
    project: &str,
    window_days: i64,
    limit: usize,
) -> Result<Vec<NodeTemperature>> {
    let now = now_unix();
    let cutoff = now - window_days * 86_400;
    let mut stmt = conn.prepare(
        "SELECT e.node_id, e.accessed_at, n.kind, n.name
         FROM access_events e
         JOIN nodes n ON n.project = e.project AND n.id = e.node_id
         WHERE e.project = ?1 AND e.accessed_at >= ?2",
    )?;
    let rows = stmt.query_map(params![project, cutoff], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut scores: AHashMap<String, NodeTemperature> = AHashMap::new();
    for row in rows {
        let (node_id, accessed_at, kind, name) = row?;
        let age_days = (now - accessed_at).max(0) as f64 / SECONDS_PER_DAY;
        let weight = 0.5_f64.powf(age_days / HALF_LIFE_DAYS);
        let entry = scores
            .entry(node_id.clone())
            .or_insert_with(|| NodeTemperature {
                node_id,
                kind,
                name,
                score: 0.0,
                access_count: 0,
                last_accessed: None,
            });
        entry.score += weight;
        entry.access_count += 1;
        entry.last_accessed = Some(entry.last_accessed.unwrap_or(accessed_at).max(accessed_at));
    }

    let mut ranked: Vec<NodeTemperature> = scores.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

/// Reality nodes with no recorded access inside the window, oldest (or
/// never-accessed) first.
pub fn cold_nodes(
    conn: &Connection,
    project: &str,
    window_days: i64,
) -> Result<Vec<NodeTemperature>> {
    let cutoff = now_unix() - window_days * 86_400;
    let mut stmt = conn.prepare(
        "SELECT n.id, n.kind, n.name,
                (SELECT MAX(accessed_at) FROM access_events e
                 WHERE e.project = n.project AND e.node_id = n.id) AS last_access
         FROM nodes n
         WHERE n.project = ?1 AND n.layer = 'reality'
           AND NOT EXISTS (SELECT 1 FROM access_events e
                           WHERE e.project = n.project AND e.node_id = n.id
                             AND e.accessed_at >= ?2)
         ORDER BY last_access IS NOT NULL, last_access, n.id",
    )?;
    let rows = stmt.query_map(params![project, cutoff], |row| {
        Ok(NodeTemperature {
            node_id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            score: 0.0,
            access_count: 0,
            last_accessed: row.get(3)?,
        })
    })?;
    let mut cold = Vec::new();
    for row in rows {
        cold.push(row?);
    }
    Ok(cold)
}

/// Recent events, newest first, optionally filtered to one node.
pub fn access_history(
    conn: &Connection,
    project: &str,
    node_id: Option<&str>,
    limit: usize,
) -> Result<Vec<AccessEvent>> {
    let mut events = Vec::new();
    let read = |row: &rusqlite::Row<'_>| -> rusqlite::Result<AccessEvent> {
        Ok(AccessEvent {
            id: row.get(0)?,
            node_id: row.get(1)?,
            agent: row.get(2)?,
            access_type: row.get(3)?,
            accessed_at: row.get(4)?,
        })
    };
    match node_id {
        Some(node) => {
            let mut stmt = conn.prepare(
                "SELECT id, node_id, agent, access_type, accessed_at FROM access_events
                 WHERE project = ?1 AND node_id = ?2 ORDER BY accessed_at DESC, id DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![project, node, limit as i64], read)?;
            for row in rows {
                events.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, node_id, agent, access_type, accessed_at FROM access_events
                 WHERE project = ?1 ORDER BY accessed_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![project, limit as i64], read)?;
            for row in rows {
                events.push(row?);
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schema::SCHEMA_SQL;

    fn open_mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn
    }

    fn add_node(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO nodes (id, project, layer, kind, name, last_updated)
             VALUES (?1, 'p', 'reality', 'function', ?1, ?2)",
            params![id, now_unix()],
        )
        .unwrap();
    }

    fn backdated_access(conn: &Connection, node: &str, days_ago: i64) {
        conn.execute(
            "INSERT INTO access_events (project, node_id, agent, access_type, accessed_at)
             VALUES ('p', ?1, 'tester', 'read', ?2)",
            params![node, now_unix() - days_ago * 86_400],
        )
        .unwrap();
    }

    #[test]
    fn test_recent_access_outweighs_stale_bulk() {
        let conn = open_mem();
        add_node(&conn, "fresh");
        add_node(&conn, "stale");
        // Two accesses a month old vs one today: decay favors today
        backdated_access(&conn, "stale", 30);
        backdated_access(&conn, "stale", 30);
        backdated_access(&conn, "fresh", 0);

        let hot = hot_nodes(&conn, "p", 60, 10).unwrap();
        assert_eq!(hot[0].node_id, "fresh");
        assert!(hot[0].score > hot[1].score);
    }

    #[test]
    fn test_events_for_removed_nodes_are_ignored() {
        let conn = open_mem();
        add_node(&conn, "kept");
        backdated_access(&conn, "kept", 1);
        backdated_access(&conn, "removed", 1);
        let hot = hot_nodes(&conn, "p", 30, 10).unwrap();
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].node_id, "kept");
    }

    #[test]
    fn test_cold_lists_untouched_nodes_first() {
        let conn = open_mem();
        add_node(&conn, "never");
        add_node(&conn, "old");
        add_node(&conn, "busy");
        backdated_access(&conn, "old", 90);
        backdated_access(&conn, "busy", 1);

        let cold = cold_nodes(&conn, "p", 30).unwrap();
        let ids: Vec<&str> = cold.iter().map(|t| t.node_id.as_str()).collect();
        assert_eq!(ids, vec!["never", "old"]);
        assert!(cold[0].last_accessed.is_none());
        assert!(cold[1].last_accessed.is_some());
    }

    #[test]
    fn test_history_is_newest_first() {
        let conn = open_mem();
        add_node(&conn, "a");
        backdated_access(&conn, "a", 2);
        backdated_access(&conn, "a", 1);
        let events = access_history(&conn, "p", Some("a"), 10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].accessed_at >= events[1].accessed_at);
    }
}
