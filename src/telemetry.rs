// Telemetry - tracing setup shared by the CLI, kiosk and server binaries

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "PERMITQ_LOG";

/// Pick the filter directive: `PERMITQ_LOG` wins, then `--verbose`, then the
/// configured level.
pub fn filter_for(configured: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(configured)
        }
    })
}

/// Install the global fmt subscriber writing to stderr.
pub fn init_tracing(configured: &str, verbose: bool) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(configured, verbose))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// Subscriber for the full-screen kiosk. Lines go to `log_path` so they do
/// not tear the alternate screen.
pub fn init_tracing_to_file(configured: &str, verbose: bool, log_path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter_for(configured, verbose))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
