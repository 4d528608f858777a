//! Administration tool for the placelist database.
//!
//! ```bash
//! placelist init                  # Create or upgrade the schema
//! placelist check                 # Report counter drift, exit 1 if any
//! placelist export --format csv --output lists.csv
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use placelist::config::Config;
use placelist::db::Database;
use placelist::export::{self, ExportFormat};
use placelist::logging;

enum Command {
    Init,
    Stats,
    Check,
    Repair,
    Export { format: ExportFormat, output: PathBuf },
}

struct Args {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut db_path = None;
    let mut command = None;
    let mut format = ExportFormat::Json;
    let mut output = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("placelist {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value_for(&args, i)));
                i += 1;
            }
            "--db" => {
                db_path = Some(PathBuf::from(value_for(&args, i)));
                i += 1;
            }
            "--format" | "-f" => {
                format = match ExportFormat::parse(value_for(&args, i)) {
                    Ok(format) => format,
                    Err(e) => usage_error(&e.to_string()),
                };
                i += 1;
            }
            "--output" | "-o" => {
                output = Some(PathBuf::from(value_for(&args, i)));
                i += 1;
            }
            "init" | "stats" | "check" | "repair" | "export" if command.is_none() => {
                command = Some(args[i].clone());
            }
            _ => usage_error(&format!("Unknown argument: {}", args[i])),
        }
        i += 1;
    }

    let command = match command.as_deref() {
        Some("init") => Command::Init,
        Some("stats") => Command::Stats,
        Some("check") => Command::Check,
        Some("repair") => Command::Repair,
        Some("export") => {
            let output = output
                .unwrap_or_else(|| PathBuf::from(format!("placelist-export.{}", format.extension())));
            Command::Export { format, output }
        }
        _ => usage_error("a command is required"),
    };

    Args {
        config_path,
        db_path,
        command,
    }
}

fn value_for(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => usage_error(&format!("{} requires an argument", args[i])),
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(2);
}

fn print_help() {
    println!(
        r#"placelist - maintenance tool for the places and lists database

USAGE:
    placelist [OPTIONS] <COMMAND>

COMMANDS:
    init                Create or upgrade the schema
    stats               Show row counts per table
    check               Report counters that disagree with their rows (exit 1 on drift)
    repair              Recompute every maintained counter
    export              Export lists with their places

OPTIONS:
    --config, -c PATH   Path to config file
    --db PATH           Database file (overrides the config)
    --format, -f FMT    Export format: json or csv (default: json)
    --output, -o PATH   Export destination
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PLACELIST_CONFIG    Path to config file (overrides default location)
    PLACELIST_LOG       Log filter, overrides logging.level in the config

Config file location: $XDG_CONFIG_HOME/placelist/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: logging disabled: {e:#}");
    }

    let db = Database::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;
    db.initialize()?;

    match args.command {
        Command::Init => {
            println!("Database ready at {}", config.database.path.display());
        }
        Command::Stats => {
            for (table, count) in db.table_counts()? {
                println!("{:<16} {:>10}", table, count);
            }
        }
        Command::Check => {
            let drift = db.verify_counters()?;
            if drift.is_empty() {
                println!("All counters consistent");
                return Ok(());
            }
            for d in &drift {
                println!(
                    "{} {} {}: stored {}, actual {}",
                    d.entity, d.id, d.field, d.stored, d.actual
                );
            }
            std::process::exit(1);
        }
        Command::Repair => {
            let changed = db.repair_counters()?;
            println!("Repaired {} counter value(s)", changed);
        }
        Command::Export { format, output } => {
            let conn = db.conn()?;
            let count = export::export_lists(&conn, &output, format)?;
            info!("Export finished");
            println!("Exported {} list(s) as {} to {}", count, format.name(), output.display());
        }
    }

    Ok(())
}
