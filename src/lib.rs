//! Sextant: deterministic intent/reality drift mapping for source trees.
//!
//! Sextant indexes a source tree into a structural "reality" graph,
//! loads declared expectations from markdown intent documents into an
//! "intent" graph, and computes the typed, severity-ranked divergence
//! between the two.
//!
//! # Graph Conventions
//!
//! - **Node ids** are stable strings: `file.{path}`,
//!   `{kind}.{path}:{name}`, `module.{import}`. Intent entries use their
//!   declared ids.
//! - **Line positions**: 1-indexed (line 1 is the first line).
//! - **Paths**: project-relative with forward slashes, so a database is
//!   portable between machines.
//! - **Layers**: intent and reality nodes share one table, tagged by
//!   `layer`; drift comparison is a pure function over the two.
//!
//! # Determinism
//!
//! Same tree, same documents, same database state ⇒ byte-identical query
//! and drift output. File walks are sorted, merges are serialized per
//! project, and findings carry a total order.

pub mod cli;
pub mod common;
pub mod drift;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod intent;
pub mod output;
pub mod sync;

pub use error::SextantError;
pub use graph::{GraphStore, Layer, ProjectLocks, RetentionPolicy};
pub use output::{generate_execution_id, output_json, JsonResponse, OutputFormat};
pub use sync::{sync_project, SyncOptions, SyncReport};
