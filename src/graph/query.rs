//! Graph traversal queries: neighborhood expansion and impact analysis.
//!
//! Both traversals are iterative breadth-first walks with explicit visited
//! sets, so cycles terminate and every reported distance is the minimum
//! over all paths. Results are sorted for byte-stable output.

use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::VecDeque;

/// One node reached during neighborhood expansion.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub id: String,
    pub kind: String,
    pub name: String,
    /// Kind of the edge that first reached this node
    pub edge_kind: String,
    /// "out" if reached along edge direction, "in" against it
    pub direction: String,
    /// Minimum hop count from the origin
    pub distance: usize,
}

/// One node affected by a change to the impact target.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactedNode {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub distance: usize,
}

/// Reverse-closure result, partitioned by distance.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactResult {
    pub target: String,
    /// Nodes with an edge directly into the target
    pub direct: Vec<ImpactedNode>,
    /// Nodes reaching the target only transitively
    pub indirect: Vec<ImpactedNode>,
}

struct Adjacency {
    /// from_id -> [(to_id, edge_kind)]
    out: AHashMap<String, Vec<(String, String)>>,
    /// to_id -> [(from_id, edge_kind)]
    incoming: AHashMap<String, Vec<(String, String)>>,
}

fn load_adjacency(conn: &Connection, project: &str) -> Result<Adjacency> {
    let mut stmt =
        conn.prepare("SELECT from_id, to_id, kind FROM edges WHERE project = ?1")?;
    let rows = stmt.query_map(params![project], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut adj = Adjacency {
        out: AHashMap::new(),
        incoming: AHashMap::new(),
    };
    for row in rows {
        let (from, to, kind) = row?;
        adj.out
            .entry(from.clone())
            .or_default()
            .push((to.clone(), kind.clone()));
        adj.incoming.entry(to).or_default().push((from, kind));
    }
    Ok(adj)
}

fn node_meta(conn: &Connection, project: &str, id: &str) -> Result<Option<(String, String)>> {
    use rusqlite::OptionalExtension;
    let meta = conn
        .query_row(
            "SELECT kind, name FROM nodes WHERE project = ?1 AND id = ?2",
            params![project, id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(meta)
}

/// Breadth-first expansion over both edge directions up to `depth` hops.
///
/// # Behavior
/// Each reachable node is reported once at its minimum distance. Edge
/// endpoints with no node row (dangling) are skipped. The origin itself is
/// not included.
pub fn neighbors(
    conn: &Connection,
    project: &str,
    node_id: &str,
    depth: usize,
) -> Result<Vec<Neighbor>> {
    if node_meta(conn, project, node_id)?.is_none() {
        bail!("node not found in project '{}': {}", project, node_id);
    }
    let adj = load_adjacency(conn, project)?;

    let mut visited: AHashSet<String> = AHashSet::new();
    visited.insert(node_id.to_string());
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((node_id.to_string(), 0));
    let mut found: Vec<Neighbor> = Vec::new();

    while let Some((current, dist)) = queue.pop_front() {
        if dist >= depth {
            continue;
        }
        let mut frontier: Vec<(String, String, &str)> = Vec::new();
        if let Some(outs) = adj.out.get(&current) {
            for (to, kind) in outs {
                frontier.push((to.clone(), kind.clone(), "out"));
            }
        }
        if let Some(ins) = adj.incoming.get(&current) {
            for (from, kind) in ins {
                frontier.push((from.clone(), kind.clone(), "in"));
            }
        }
        for (next, edge_kind, direction) in frontier {
            if !visited.insert(next.clone()) {
                continue;
            }
            let Some((kind, name)) = node_meta(conn, project, &next)? else {
                continue;
            };
            found.push(Neighbor {
                id: next.clone(),
                kind,
                name,
                edge_kind,
                direction: direction.to_string(),
                distance: dist + 1,
            });
            queue.push_back((next, dist + 1));
        }
    }

    found.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    Ok(found)
}

/// Reverse transitive closure: everything with a path of edges INTO the
/// target, i.e. everything a change to the target can break.
///
/// Distance 1 nodes land in `direct`, the rest in `indirect`. Cycles
/// (including self-edges) terminate via the visited set.
pub fn impact(conn: &Connection, project: &str, node_id: &str) -> Result<ImpactResult> {
    if node_meta(conn, project, node_id)?.is_none() {
        bail!("node not found in project '{}': {}", project, node_id);
    }
    let adj = load_adjacency(conn, project)?;

    let mut visited: AHashSet<String> = AHashSet::new();
    visited.insert(node_id.to_string());
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((node_id.to_string(), 0));
    let mut direct = Vec::new();
    let mut indirect = Vec::new();

    while let Some((current, dist)) = queue.pop_front() {
        if let Some(ins) = adj.incoming.get(&current) {
            for (from, _kind) in ins {
                if !visited.insert(from.clone()) {
                    continue;
                }
                let Some((kind, name)) = node_meta(conn, project, from)? else {
                    continue;
                };
                let reached = ImpactedNode {
                    id: from.clone(),
                    kind,
                    name,
                    distance: dist + 1,
                };
                if dist + 1 == 1 {
                    direct.push(reached);
                } else {
                    indirect.push(reached);
                }
                queue.push_back((from.clone(), dist + 1));
            }
        }
    }

    direct.sort_by(|a, b| a.id.cmp(&b.id));
    indirect.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    Ok(ImpactResult {
        target: node_id.to_string(),
        direct,
        indirect,
    })
}
