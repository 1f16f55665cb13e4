//! Command-line argument parsing.
//!
//! Deliberately dependency-free flag parsing: every command is a flat list
//! of `--flag value` pairs, parsed in one pass with explicit errors for
//! missing or unknown flags.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Parsed CLI command.
#[derive(Debug)]
pub enum Command {
    /// Index a source tree into the graph
    Sync {
        root: PathBuf,
        db: PathBuf,
        project: String,
        full: bool,
        output_format: OutputFormat,
    },
    /// Compare intent against reality
    Drift {
        db: PathBuf,
        project: String,
        intent_filter: Option<String>,
        staleness_days: i64,
        output_format: OutputFormat,
    },
    /// BFS neighborhood of a node
    Neighbors {
        db: PathBuf,
        project: String,
        id: String,
        depth: usize,
        output_format: OutputFormat,
    },
    /// Reverse-edge impact closure of a node
    Impact {
        db: PathBuf,
        project: String,
        id: String,
        output_format: OutputFormat,
    },
    /// Most-accessed nodes in a window
    Hot {
        db: PathBuf,
        project: String,
        window_days: i64,
        limit: usize,
        output_format: OutputFormat,
    },
    /// Nodes untouched within a window
    Cold {
        db: PathBuf,
        project: String,
        window_days: i64,
        output_format: OutputFormat,
    },
    /// Record an access event against a node
    Access {
        db: PathBuf,
        project: String,
        id: String,
        agent: String,
        access_type: String,
        output_format: OutputFormat,
    },
    /// Database statistics
    Status {
        db: PathBuf,
        project: Option<String>,
        output_format: OutputFormat,
    },
}

impl Command {
    /// Output format the invocation asked for, used for both payload and
    /// error rendering.
    pub fn output_format(&self) -> OutputFormat {
        match self {
            Command::Sync { output_format, .. }
            | Command::Drift { output_format, .. }
            | Command::Neighbors { output_format, .. }
            | Command::Impact { output_format, .. }
            | Command::Hot { output_format, .. }
            | Command::Cold { output_format, .. }
            | Command::Access { output_format, .. }
            | Command::Status { output_format, .. } => *output_format,
        }
    }
}

pub fn print_usage() {
    eprintln!("Sextant - intent/reality drift mapping for source trees");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  sextant <command> [arguments]");
    eprintln!("  sextant --help");
    eprintln!();
    eprintln!("  sextant sync --root <DIR> --db <FILE> --project <NAME> [--full]");
    eprintln!("  sextant drift --db <FILE> --project <NAME> [--intent-filter <ID>] [--staleness-days <N>]");
    eprintln!("  sextant graph neighbors --db <FILE> --project <NAME> --id <ID> [--depth <N>]");
    eprintln!("  sextant graph impact --db <FILE> --project <NAME> --id <ID>");
    eprintln!("  sextant graph hot --db <FILE> --project <NAME> [--window-days <N>] [--limit <N>]");
    eprintln!("  sextant graph cold --db <FILE> --project <NAME> [--window-days <N>]");
    eprintln!("  sextant access --db <FILE> --project <NAME> --id <ID> [--agent <NAME>] [--type <T>]");
    eprintln!("  sextant status --db <FILE> [--project <NAME>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  sync    Index source files and intent documents into the graph");
    eprintln!("  drift   Compare declared intent against extracted reality");
    eprintln!("  graph   Traversal queries: neighbors, impact, hot, cold");
    eprintln!("  access  Record that an agent touched a node");
    eprintln!("  status  Show graph statistics");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --output <FORMAT>   Output format: human (default), json, or pretty");
    eprintln!();
    eprintln!("Sync arguments:");
    eprintln!("  --root <DIR>        Source tree to index");
    eprintln!("  --db <FILE>         Path to the graph database");
    eprintln!("  --project <NAME>    Project name inside the database");
    eprintln!("  --full              Ignore the hash ledger and reprocess everything");
    eprintln!();
    eprintln!("Drift arguments:");
    eprintln!("  --intent-filter <ID>   Only findings for one intent entry");
    eprintln!("  --staleness-days <N>   Mismatch-to-stale threshold (default: 30)");
    eprintln!();
    eprintln!("Exit codes:");
    eprintln!("  sync: non-zero if any file could not be read");
    eprintln!("  drift: non-zero on critical findings, or a required intent with no implementation");
}

pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Flag parser state shared by all commands.
struct Flags<'a> {
    args: &'a [String],
    db: Option<PathBuf>,
    root: Option<PathBuf>,
    project: Option<String>,
    id: Option<String>,
    output_format: OutputFormat,
}

impl<'a> Flags<'a> {
    fn new(args: &'a [String]) -> Self {
        Flags {
            args,
            db: None,
            root: None,
            project: None,
            id: None,
            output_format: OutputFormat::Human,
        }
    }

    fn value(&self, i: usize, flag: &str) -> Result<&'a str> {
        self.args
            .get(i + 1)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("{} requires an argument", flag))
    }

    /// Handle flags common to every command. Returns the new index, or
    /// None if the flag is command-specific.
    fn common(&mut self, i: usize) -> Result<Option<usize>> {
        match self.args[i].as_str() {
            "--db" => {
                self.db = Some(PathBuf::from(self.value(i, "--db")?));
                Ok(Some(i + 2))
            }
            "--root" => {
                self.root = Some(PathBuf::from(self.value(i, "--root")?));
                Ok(Some(i + 2))
            }
            "--project" => {
                self.project = Some(self.value(i, "--project")?.to_string());
                Ok(Some(i + 2))
            }
            "--id" => {
                self.id = Some(self.value(i, "--id")?.to_string());
                Ok(Some(i + 2))
            }
            "--output" => {
                let raw = self.value(i, "--output")?;
                self.output_format = OutputFormat::from_str(raw).ok_or_else(|| {
                    anyhow!("Invalid output format: {}. Must be human, json, or pretty", raw)
                })?;
                Ok(Some(i + 2))
            }
            _ => Ok(None),
        }
    }

    fn require_db(&self) -> Result<PathBuf> {
        self.db.clone().ok_or_else(|| anyhow!("--db is required"))
    }

    fn require_project(&self) -> Result<String> {
        self.project
            .clone()
            .ok_or_else(|| anyhow!("--project is required"))
    }

    fn require_id(&self) -> Result<String> {
        self.id.clone().ok_or_else(|| anyhow!("--id is required"))
    }
}

fn parse_args_from(args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Err(anyhow!("Missing command"));
    }
    let command = args[1].as_str();

    if command == "--help" || command == "-h" {
        print_usage();
        std::process::exit(0);
    }
    if command == "--version" || command == "-V" {
        println!("sextant {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    match command {
        "sync" => {
            let mut flags = Flags::new(args);
            let mut full = false;
            let mut i = 2;
            while i < args.len() {
                if let Some(next) = flags.common(i)? {
                    i = next;
                    continue;
                }
                match args[i].as_str() {
                    "--full" => {
                        full = true;
                        i += 1;
                    }
                    other => return Err(anyhow!("Unknown argument: {}", other)),
                }
            }
            Ok(Command::Sync {
                root: flags.root.clone().ok_or_else(|| anyhow!("--root is required"))?,
                db: flags.require_db()?,
                project: flags.require_project()?,
                full,
                output_format: flags.output_format,
            })
        }
        "drift" => {
            let mut flags = Flags::new(args);
            let mut intent_filter = None;
            let mut staleness_days: i64 = 30;
            let mut i = 2;
            while i < args.len() {
                if let Some(next) = flags.common(i)? {
                    i = next;
                    continue;
                }
                match args[i].as_str() {
                    "--intent-filter" => {
                        intent_filter = Some(flags.value(i, "--intent-filter")?.to_string());
                        i += 2;
                    }
                    "--staleness-days" => {
                        staleness_days = flags.value(i, "--staleness-days")?.parse()?;
                        i += 2;
                    }
                    other => return Err(anyhow!("Unknown argument: {}", other)),
                }
            }
            Ok(Command::Drift {
                db: flags.require_db()?,
                project: flags.require_project()?,
                intent_filter,
                staleness_days,
                output_format: flags.output_format,
            })
        }
        "graph" => {
            let sub = args
                .get(2)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("graph requires a subcommand: neighbors, impact, hot, cold"))?;
            let mut flags = Flags::new(args);
            let mut depth: usize = 2;
            let mut window_days: i64 = 30;
            let mut limit: usize = 20;
            let mut i = 3;
            while i < args.len() {
                if let Some(next) = flags.common(i)? {
                    i = next;
                    continue;
                }
                match args[i].as_str() {
                    "--depth" => {
                        depth = flags.value(i, "--depth")?.parse()?;
                        i += 2;
                    }
                    "--window-days" => {
                        window_days = flags.value(i, "--window-days")?.parse()?;
                        i += 2;
                    }
                    "--limit" => {
                        limit = flags.value(i, "--limit")?.parse()?;
                        i += 2;
                    }
                    other => return Err(anyhow!("Unknown argument: {}", other)),
                }
            }
            let db = flags.require_db()?;
            let project = flags.require_project()?;
            match sub {
                "neighbors" => Ok(Command::Neighbors {
                    db,
                    project,
                    id: flags.require_id()?,
                    depth,
                    output_format: flags.output_format,
                }),
                "impact" => Ok(Command::Impact {
                    db,
                    project,
                    id: flags.require_id()?,
                    output_format: flags.output_format,
                }),
                "hot" => Ok(Command::Hot {
                    db,
                    project,
                    window_days,
                    limit,
                    output_format: flags.output_format,
                }),
                "cold" => Ok(Command::Cold {
                    db,
                    project,
                    window_days,
                    output_format: flags.output_format,
                }),
                other => Err(anyhow!("Unknown graph subcommand: {}", other)),
            }
        }
        "access" => {
            let mut flags = Flags::new(args);
            let mut agent = "unknown".to_string();
            let mut access_type = "read".to_string();
            let mut i = 2;
            while i < args.len() {
                if let Some(next) = flags.common(i)? {
                    i = next;
                    continue;
                }
                match args[i].as_str() {
                    "--agent" => {
                        agent = flags.value(i, "--agent")?.to_string();
                        i += 2;
                    }
                    "--type" => {
                        access_type = flags.value(i, "--type")?.to_string();
                        i += 2;
                    }
                    other => return Err(anyhow!("Unknown argument: {}", other)),
                }
            }
            Ok(Command::Access {
                db: flags.require_db()?,
                project: flags.require_project()?,
                id: flags.require_id()?,
                agent,
                access_type,
                output_format: flags.output_format,
            })
        }
        "status" => {
            let mut flags = Flags::new(args);
            let mut i = 2;
            while i < args.len() {
                if let Some(next) = flags.common(i)? {
                    i = next;
                    continue;
                }
                return Err(anyhow!("Unknown argument: {}", args[i]));
            }
            Ok(Command::Status {
                db: flags.require_db()?,
                project: flags.project.clone(),
                output_format: flags.output_format,
            })
        }
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}
