//! `labtrack` maintenance binary.
//!
//! Lifecycle operations are library calls made by the host application. This
//! binary only covers what an operator or scheduler runs by hand: creating
//! the database, inspecting lab metadata and the yearly counter reset.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use labtrack::{config, db, metadata, ErrorKind, LabError};

/// Parsed CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "labtrack", version, about = "Maintenance commands for the lab sample database")]
struct Args {
    /// Database file (default: ~/Labtrack/labtrack.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or migrate the database and seed lab metadata.
    Init,
    /// Print lab metadata as JSON.
    Metadata,
    /// Reset every sample type's sequence counter to zero (run once a year).
    ResetSequences,
}

fn main() -> ExitCode {
    labtrack::init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("labtrack: error: {e}");
            ExitCode::from(exit_code(e.kind()))
        }
    }
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation | ErrorKind::Computation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Conflict | ErrorKind::Unauthorised => 4,
        ErrorKind::Storage => 5,
    }
}

fn run(args: &Args) -> Result<(), LabError> {
    let path = args.db.clone().unwrap_or_else(config::database_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    tracing::info!("{} v{} using {}", config::APP_NAME, config::APP_VERSION, path.display());
    let conn = db::open_database(&path)?;

    match args.command {
        Command::Init => {
            let seeded = metadata::seed_metadata(&conn)?;
            println!(
                "Database ready at {} (certification {})",
                path.display(),
                seeded.current_certification_number
            );
        }
        Command::Metadata => {
            let current = metadata::get_metadata(&conn)?;
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        Command::ResetSequences => {
            let reset = metadata::reset_sample_sequences(&conn)?;
            println!("Reset {reset} sample type counter(s)");
        }
    }
    Ok(())
}
