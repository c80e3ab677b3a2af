//! Error types for the observation service.
//!
//! Absence of data is never an error; it is carried as a masked cell.

use chrono::{DateTime, Utc};

/// Failures talking to the observation store. Fatal to the call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not connect to observation store: {0}")]
    Connect(#[source] postgres::Error),

    #[error("observation query failed: {0}")]
    Query(#[source] postgres::Error),

    #[error("could not decode column {column} of result row: {source}")]
    Row {
        column: &'static str,
        #[source]
        source: postgres::Error,
    },
}

/// A row that does not fit the matrix it is being pivoted into.
///
/// This signals a broken assumption about the store (unaligned or
/// out-of-window timestamps), not missing data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PivotError {
    #[error(
        "row for station {station_id} (obj_id {obj_id}) at {timestamp} maps to slot {slot}, \
         outside matrix of shape {shape:?}"
    )]
    SlotOutOfRange {
        obj_id: i64,
        station_id: String,
        timestamp: DateTime<Utc>,
        slot: i64,
        shape: (usize, usize),
    },

    #[error(
        "row for station {station_id} (obj_id {obj_id}) at {timestamp} is not aligned \
         to an hour boundary after {begin}"
    )]
    Misaligned {
        obj_id: i64,
        station_id: String,
        timestamp: DateTime<Utc>,
        begin: DateTime<Utc>,
    },

    #[error(
        "row for station {station_id} (obj_id {obj_id}) at {timestamp} does not match \
         requested instant {expected}"
    )]
    InstantMismatch {
        obj_id: i64,
        station_id: String,
        timestamp: DateTime<Utc>,
        expected: DateTime<Utc>,
    },
}

/// Cache read/write failures. Reads fall through to the store; writes are
/// logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry {path} could not be encoded or decoded: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache entry {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid database connection string: {0}")]
    Database(#[source] postgres::Error),
}

/// Top-level error returned by every fetch entry point.
#[derive(Debug, thiserror::Error)]
pub enum ObsError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pivot(#[from] PivotError),
}
