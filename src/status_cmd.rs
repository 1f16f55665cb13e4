//! Status command implementation.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use sextant::graph::Layer;
use sextant::output::{output_json, JsonResponse, OutputFormat, StatusResponse};
use sextant::GraphStore;

pub fn run(db: &Path, project: Option<&str>, output_format: OutputFormat) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;

    let projects: Vec<String> = match project {
        Some(name) => {
            store.require_project(name)?;
            vec![name.to_string()]
        }
        None => store
            .list_projects()?
            .into_iter()
            .map(|(name, _)| name)
            .collect(),
    };

    let mut responses = Vec::new();
    for name in &projects {
        responses.push(StatusResponse {
            project: name.clone(),
            root: store.project_root(name)?,
            reality_nodes: store.count_nodes(name, Some(Layer::Reality))?,
            intent_nodes: store.count_nodes(name, Some(Layer::Intent))?,
            edges: store.count_edges(name)?,
            tracked_files: store.count_file_records(name)?,
            node_kinds: store.registered_node_kinds()?,
            edge_kinds: store.registered_edge_kinds()?,
        });
    }

    if output_format.is_json() {
        output_json(&JsonResponse::new("status", &responses), output_format)?;
    } else if responses.is_empty() {
        println!("No projects registered; run `sextant sync` first");
    } else {
        for r in &responses {
            println!("Project: {}", r.project);
            if let Some(root) = &r.root {
                println!("  root: {}", root);
            }
            println!(
                "  nodes: {} reality, {} intent",
                r.reality_nodes, r.intent_nodes
            );
            println!("  edges: {}", r.edges);
            println!("  tracked files: {}", r.tracked_files);
            println!("  node kinds: {}", r.node_kinds.join(", "));
            println!("  edge kinds: {}", r.edge_kinds.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}
