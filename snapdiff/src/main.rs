//! snapdiff - differential filesystem dump
//!
//! Prints what changed under the given directories since the previous run
//! recorded in FILELIST, then updates FILELIST.

use anyhow::Result;
use clap::{ArgAction, Parser};
use snapdiff::config::Config;
use snapdiff::executor::{resolve_root, DumpExecutor, DumpJob, ListSink, PackedSink};
use snapdiff::shutdown::ShutdownCoordinator;
use snapdiff::utils::{logger, privilege, SnapError};
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Snapshot of the previous run, created when missing
    #[arg(value_name = "FILELIST")]
    filelist: PathBuf,

    /// Directories to dump
    #[arg(value_name = "DIR", required = true)]
    dirs: Vec<PathBuf>,

    /// Do not honor exclusion marker files
    #[arg(short = 'n')]
    no_marker: bool,

    /// More output, repeat for debug
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Stay on the filesystem of each directory
    #[arg(short = 'x')]
    one_file_system: bool,

    /// NUL instead of newline after every record
    #[arg(short = '0')]
    null: bool,

    /// Write a packed stream with file contents instead of a list
    #[arg(short = 'c')]
    contents: bool,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print a JSON summary to stderr when done
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Nothing may be touched before this check.
    privilege::ensure_unprivileged()?;
    let cwd = std::env::current_dir().map_err(SnapError::WorkingDirectory)?;

    let mut config = Config::load(args.config.as_deref())?;
    config.dump.null_delimited |= args.null;
    config.dump.one_file_system |= args.one_file_system;
    if args.no_marker {
        config.dump.honor_marker = false;
    }

    let level = logger::level_for(args.verbose, args.log_level.as_deref(), &config.log.level);
    logger::init(&level)?;

    tracing::debug!("Starting snapdiff v{}", env!("CARGO_PKG_VERSION"));

    let coordinator = ShutdownCoordinator::new();
    coordinator.install()?;

    let job = DumpJob {
        snapshot: args.filelist,
        roots: args.dirs.iter().map(|dir| resolve_root(&cwd, dir)).collect(),
        delimiter: config.dump.delimiter(),
        walk: config.dump.walk_options(),
    };
    let executor = DumpExecutor::new(job, coordinator.token());
    let out = BufWriter::new(io::stdout().lock());

    let summary = if args.contents {
        executor.execute(&mut PackedSink::new(out))?
    } else {
        executor.execute(&mut ListSink::new(out, config.dump.delimiter()))?
    };

    if args.summary {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }
    if summary.interrupted {
        anyhow::bail!("Dump interrupted");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from(["snapdiff", "-0", "-x", "-vv", "list", "/a", "b"]).unwrap();
        assert!(args.null && args.one_file_system && !args.no_marker);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.dirs, vec![PathBuf::from("/a"), PathBuf::from("b")]);
    }

    #[test]
    fn test_directory_required() {
        assert!(Args::try_parse_from(["snapdiff", "list"]).is_err());
        assert!(Args::try_parse_from(["snapdiff"]).is_err());
    }
}
