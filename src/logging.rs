/// Structured logging for the observation service.
///
/// Events go through `tracing`; every event is tagged with the data source
/// it concerns (store, cache, or the service itself) so store outages and
/// cache problems can be told apart in the log.

use std::fmt;

use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Database,
    Cache,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Database => write!(f, "DB"),
            DataSource::Cache => write!(f, "CACHE"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

/// Initialize tracing from a verbosity count.
///
/// - 0 -> warn
/// - 1 -> info
/// - 2 -> debug
/// - 3+ -> trace
///
/// `RUST_LOG` overrides the count if set. Calling this twice is harmless.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("snowobs_service={level},snowobs={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

pub fn info(source: DataSource, message: &str) {
    tracing::info!(source = %source, "{}", message);
}

pub fn warn(source: DataSource, message: &str) {
    tracing::warn!(source = %source, "{}", message);
}

pub fn error(source: DataSource, message: &str) {
    tracing::error!(source = %source, "{}", message);
}

pub fn debug(source: DataSource, message: &str) {
    tracing::debug!(source = %source, "{}", message);
}

/// Logs generated SQL: at INFO when the caller asked for verbose output,
/// otherwise at DEBUG.
pub fn log_query(sql: &str, verbose: bool) {
    let message = format!("query \"{}\"", sql);
    if verbose {
        info(DataSource::Database, &message);
    } else {
        debug(DataSource::Database, &message);
    }
}

/// Log a store failure for a variable before it is returned to the caller.
pub fn log_store_failure(variable: &str, err: &dyn std::error::Error) {
    error(
        DataSource::Database,
        &format!("{} query failed: {}", variable, err),
    );
}

/// Summarises a freshly pivoted result.
pub fn log_fetch_summary(variable: &str, stations: usize, slots: usize, masked: usize) {
    let total = stations * slots;
    let message = format!(
        "{}: {} stations x {} slots, {}/{} cells with data",
        variable,
        stations,
        slots,
        total - masked,
        total
    );
    if stations == 0 {
        warn(DataSource::Database, &message);
    } else {
        info(DataSource::Database, &message);
    }
}
