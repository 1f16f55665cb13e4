//! Graph query commands: neighbors, impact, hot, cold, access.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use sextant::output::{
    output_json, ImpactResponse, JsonResponse, NeighborsResponse, OutputFormat,
    TemperatureResponse,
};
use sextant::GraphStore;

pub fn neighbors(
    db: &Path,
    project: &str,
    id: &str,
    depth: usize,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;
    let neighbors = store.neighbors(project, id, depth)?;

    if output_format.is_json() {
        let response = NeighborsResponse {
            project: project.to_string(),
            node: id.to_string(),
            depth,
            neighbors,
        };
        output_json(&JsonResponse::new("graph neighbors", &response), output_format)?;
    } else if neighbors.is_empty() {
        println!("No neighbors within {} hop(s) of {}", depth, id);
    } else {
        println!("Neighbors of {} (depth {}):", id, depth);
        for n in &neighbors {
            println!(
                "  [{}] {} ({}) via {} {}",
                n.distance, n.id, n.kind, n.direction, n.edge_kind
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn impact(db: &Path, project: &str, id: &str, output_format: OutputFormat) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;
    let impact = store.impact(project, id)?;

    if output_format.is_json() {
        let response = ImpactResponse {
            project: project.to_string(),
            impact,
        };
        output_json(&JsonResponse::new("graph impact", &response), output_format)?;
    } else {
        println!("Impact of changing {}:", impact.target);
        println!("  direct ({}):", impact.direct.len());
        for n in &impact.direct {
            println!("    {} ({})", n.id, n.kind);
        }
        println!("  indirect ({}):", impact.indirect.len());
        for n in &impact.indirect {
            println!("    {} ({}, distance {})", n.id, n.kind, n.distance);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn hot(
    db: &Path,
    project: &str,
    window_days: i64,
    limit: usize,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;
    let nodes = store.hot_nodes(project, window_days, limit)?;
    print_temperature("graph hot", project, window_days, nodes, output_format)
}

pub fn cold(
    db: &Path,
    project: &str,
    window_days: i64,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let store = GraphStore::open(db)?;
    let nodes = store.cold_nodes(project, window_days)?;
    print_temperature("graph cold", project, window_days, nodes, output_format)
}

fn print_temperature(
    command: &str,
    project: &str,
    window_days: i64,
    nodes: Vec<sextant::graph::NodeTemperature>,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    if output_format.is_json() {
        let response = TemperatureResponse {
            project: project.to_string(),
            window_days,
            nodes,
        };
        output_json(&JsonResponse::new(command, &response), output_format)?;
    } else if nodes.is_empty() {
        println!("No matching nodes in the last {} day(s)", window_days);
    } else {
        for n in &nodes {
            match n.last_accessed {
                Some(ts) => println!(
                    "  {:.3}  {} ({}) last accessed at {}",
                    n.score, n.node_id, n.kind, ts
                ),
                None => println!("  {:.3}  {} ({}) never accessed", n.score, n.node_id, n.kind),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn access(
    db: &Path,
    project: &str,
    id: &str,
    agent: &str,
    access_type: &str,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let mut store = GraphStore::open(db)?;
    store.require_project(project)?;
    let event_id = store.record_access(project, id, agent, access_type)?;

    if output_format.is_json() {
        #[derive(serde::Serialize)]
        struct AccessResponse<'a> {
            project: &'a str,
            node: &'a str,
            agent: &'a str,
            access_type: &'a str,
            event_id: i64,
        }
        let response = AccessResponse {
            project,
            node: id,
            agent,
            access_type,
            event_id,
        };
        output_json(&JsonResponse::new("access", &response), output_format)?;
    } else {
        println!("Recorded {} access to {} by {}", access_type, id, agent);
    }
    Ok(ExitCode::SUCCESS)
}
