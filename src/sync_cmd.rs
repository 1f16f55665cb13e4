//! Sync command implementation.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use sextant::output::{output_json, JsonResponse, OutputFormat, SyncResponse};
use sextant::{sync_project, GraphStore, SyncOptions};

pub fn run(
    root: &Path,
    db: &Path,
    project: &str,
    full: bool,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let mut store = GraphStore::open(db)?;
    let options = SyncOptions {
        full,
        ..SyncOptions::default()
    };
    let report = sync_project(&mut store, project, root, &options)?;
    let hard_failed = !report.hard_failures.is_empty();

    let response = SyncResponse {
        project: project.to_string(),
        root: root.to_string_lossy().to_string(),
        full,
        files_processed: report.files_processed,
        files_skipped: report.files_skipped,
        files_unsupported: report.files_unsupported,
        files_removed: report.files_removed,
        nodes_written: report.nodes_written,
        edges_written: report.edges_written,
        intent_documents: report.intent_documents,
        intent_warnings: report.intent_warnings,
        parse_failures: report.parse_failures,
        hard_failures: report.hard_failures,
        duration_ms: report.duration_ms,
    };

    if output_format.is_json() {
        output_json(&JsonResponse::new("sync", &response), output_format)?;
    } else {
        println!(
            "Synced project '{}' from {} in {}ms",
            project, response.root, response.duration_ms
        );
        println!(
            "  files: {} processed, {} skipped, {} unsupported, {} removed",
            response.files_processed,
            response.files_skipped,
            response.files_unsupported,
            response.files_removed
        );
        println!(
            "  graph: {} nodes, {} edges written ({} intent documents)",
            response.nodes_written, response.edges_written, response.intent_documents
        );
        for warning in &response.intent_warnings {
            println!("  WARN intent {}: {}", warning.document, warning.reason);
        }
        for failure in &response.parse_failures {
            println!("  PARSE-FAIL {}: {}", failure.path, failure.reason);
        }
        for failure in &response.hard_failures {
            println!("  ERROR {}: {}", failure.path, failure.reason);
        }
    }

    if hard_failed {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
