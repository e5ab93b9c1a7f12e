//! Logging configuration using tracing.
//!
//! Diagnostics always go to standard error; standard output carries the
//! dump list or the packed stream.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the specified level
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()?;

    Ok(())
}

/// Map a `-v` count onto a level, unless one was given explicitly.
pub fn level_for(verbose: u8, explicit: Option<&str>, configured: &str) -> String {
    if let Some(level) = explicit {
        return level.to_string();
    }
    match verbose {
        0 => configured.to_string(),
        1 => "info".to_string(),
        _ => "debug".to_string(),
    }
}
