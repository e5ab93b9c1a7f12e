//! snapdiff-up - materialize a packed record stream
//!
//! Reads the stream written by `snapdiff -c` and rebuilds the objects it
//! describes below DIRECTORY.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use snapdiff::config::Config;
use snapdiff::executor::resolve_root;
use snapdiff::shutdown::ShutdownCoordinator;
use snapdiff::sync::{MaterializeOptions, Materializer};
use snapdiff::utils::{logger, privilege, SnapError};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory the stream is rebuilt under
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Only log what would be done
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Create DIRECTORY when it does not exist
    #[arg(short = 't')]
    create_root: bool,

    /// More output, repeat for debug
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Copy buffer size in bytes
    #[arg(long, value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print a JSON summary to stderr when done
    #[arg(long)]
    summary: bool,

    /// Read the stream from FILE instead of stdin
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    privilege::ensure_unprivileged()?;
    let cwd = std::env::current_dir().map_err(SnapError::WorkingDirectory)?;

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(buffer_size) = args.buffer_size {
        config.restore.buffer_size = buffer_size;
    }
    config.restore.create_root |= args.create_root;
    config.validate()?;

    let level = logger::level_for(args.verbose, args.log_level.as_deref(), &config.log.level);
    logger::init(&level)?;

    let root = resolve_root(&cwd, &args.directory);
    if !root.is_dir() && !args.dry_run {
        if !config.restore.create_root {
            anyhow::bail!("{} is not a directory (use -t to create it)", root.display());
        }
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create {}", root.display()))?;
        info!("Created {}", root.display());
    }

    let coordinator = ShutdownCoordinator::new();
    coordinator.install()?;

    let materializer = Materializer::new(MaterializeOptions {
        root,
        dry_run: args.dry_run,
        buffer_size: config.restore.buffer_size,
    });

    let summary = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            materializer.run(BufReader::new(file), &coordinator.token())?
        }
        None => materializer.run(io::stdin().lock(), &coordinator.token())?,
    };

    if summary.failures() > 0 {
        warn!("{} objects could not be materialized", summary.failures());
    }
    if args.summary {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }
    if summary.interrupted {
        anyhow::bail!("Materialization interrupted");
    }

    Ok(())
}
