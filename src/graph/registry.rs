//! Kind registry: tracks every node/edge kind ever written to a store.
//!
//! Built-ins are seeded on open; custom kinds register themselves on first
//! insert. The registry is append-only so a kind stays queryable even after
//! the last row using it is deleted.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::graph::schema::{EdgeKind, NodeKind};

const BUILTIN_NODE_KINDS: &[NodeKind] = &[
    NodeKind::File,
    NodeKind::Function,
    NodeKind::Method,
    NodeKind::Class,
    NodeKind::Interface,
    NodeKind::Enum,
    NodeKind::Module,
    NodeKind::TypeAlias,
    NodeKind::Constant,
    NodeKind::Api,
    NodeKind::Flow,
    NodeKind::Domain,
    NodeKind::Page,
    NodeKind::Test,
    NodeKind::Doc,
];

const BUILTIN_EDGE_KINDS: &[EdgeKind] = &[
    EdgeKind::Contains,
    EdgeKind::Imports,
    EdgeKind::Calls,
    EdgeKind::Extends,
    EdgeKind::Implements,
    EdgeKind::Uses,
    EdgeKind::Covers,
    EdgeKind::Depends,
];

/// Seed built-in kinds. Idempotent; runs on every store open.
pub fn seed_builtin_kinds(conn: &Connection) -> Result<()> {
    for kind in BUILTIN_NODE_KINDS {
        conn.execute(
            "INSERT OR IGNORE INTO node_kind_registry (kind, builtin) VALUES (?1, 1)",
            params![kind.as_str()],
        )?;
    }
    for kind in BUILTIN_EDGE_KINDS {
        conn.execute(
            "INSERT OR IGNORE INTO edge_kind_registry (kind, builtin) VALUES (?1, 1)",
            params![kind.as_str()],
        )?;
    }
    Ok(())
}

/// Register a node kind tag if unseen. Called from every node insert path.
pub fn register_node_kind(conn: &Connection, kind: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO node_kind_registry (kind, builtin) VALUES (?1, 0)",
        params![kind],
    )?;
    Ok(())
}

/// Register an edge kind tag if unseen.
pub fn register_edge_kind(conn: &Connection, kind: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO edge_kind_registry (kind, builtin) VALUES (?1, 0)",
        params![kind],
    )?;
    Ok(())
}

pub fn list_node_kinds(conn: &Connection) -> Result<Vec<String>> {
    list_kinds(conn, "node_kind_registry")
}

pub fn list_edge_kinds(conn: &Connection) -> Result<Vec<String>> {
    list_kinds(conn, "edge_kind_registry")
}

fn list_kinds(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("SELECT kind FROM {} ORDER BY kind", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut kinds = Vec::new();
    for row in rows {
        kinds.push(row?);
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schema::SCHEMA_SQL;

    fn open_mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        seed_builtin_kinds(&conn).unwrap();
        conn
    }

    #[test]
    fn test_builtins_seeded() {
        let conn = open_mem();
        let kinds = list_node_kinds(&conn).unwrap();
        assert!(kinds.contains(&"function".to_string()));
        assert!(kinds.contains(&"flow".to_string()));
        let edge_kinds = list_edge_kinds(&conn).unwrap();
        assert!(edge_kinds.contains(&"covers".to_string()));
    }

    #[test]
    fn test_custom_kind_registration_is_idempotent() {
        let conn = open_mem();
        register_node_kind(&conn, "widget").unwrap();
        register_node_kind(&conn, "widget").unwrap();
        let kinds = list_node_kinds(&conn).unwrap();
        assert_eq!(kinds.iter().filter(|k| *k == "widget").count(), 1);
    }
}
