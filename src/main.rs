//! Sextant CLI - deterministic intent/reality drift mapping
//!
//! Usage: sextant <command> [arguments]

mod drift_cmd;
mod graph_cmd;
mod status_cmd;
mod sync_cmd;

use std::process::ExitCode;

use sextant::cli::{self, Command};
use sextant::output::{output_json, ErrorResponse, JsonResponse};

fn main() -> ExitCode {
    let command = match cli::parse_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            cli::print_usage();
            return ExitCode::from(2);
        }
    };
    let output_format = command.output_format();

    let result = match command {
        Command::Sync {
            root,
            db,
            project,
            full,
            output_format,
        } => sync_cmd::run(&root, &db, &project, full, output_format),
        Command::Drift {
            db,
            project,
            intent_filter,
            staleness_days,
            output_format,
        } => drift_cmd::run(&db, &project, intent_filter.as_deref(), staleness_days, output_format),
        Command::Neighbors {
            db,
            project,
            id,
            depth,
            output_format,
        } => graph_cmd::neighbors(&db, &project, &id, depth, output_format),
        Command::Impact {
            db,
            project,
            id,
            output_format,
        } => graph_cmd::impact(&db, &project, &id, output_format),
        Command::Hot {
            db,
            project,
            window_days,
            limit,
            output_format,
        } => graph_cmd::hot(&db, &project, window_days, limit, output_format),
        Command::Cold {
            db,
            project,
            window_days,
            output_format,
        } => graph_cmd::cold(&db, &project, window_days, output_format),
        Command::Access {
            db,
            project,
            id,
            agent,
            access_type,
            output_format,
        } => graph_cmd::access(&db, &project, &id, &agent, &access_type, output_format),
        Command::Status {
            db,
            project,
            output_format,
        } => status_cmd::run(&db, project.as_deref(), output_format),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            if output_format.is_json() {
                let payload = JsonResponse::new(
                    "error",
                    ErrorResponse {
                        error: format!("{:#}", e),
                    },
                );
                if output_json(&payload, output_format).is_err() {
                    eprintln!("Error: {:#}", e);
                }
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}
