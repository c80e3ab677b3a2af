//! Hourly point observations (snow depth, SWE, air temperature, snowfall,
//! precipitation) from a relational observation store, pivoted into
//! station-by-time matrices and cached on disk once a window is historical.
//!
//! Modules:
//! - `model`: variable descriptors, stations, rows and requests
//! - `query`: SQL for a request
//! - `store`: the store contract, a PostgreSQL store and an in-memory one
//! - `pivot`: rows to matrix
//! - `matrix`: the pivoted result
//! - `cache`: the 60-day caching policy and on-disk entries
//! - `fetch`: the public retrieval functions
//! - `config`, `logging`, `error`: service plumbing

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod matrix;
pub mod model;
pub mod pivot;
pub mod query;
pub mod store;

pub use error::{CacheError, ConfigError, ObsError, PivotError, StoreError};
pub use fetch::{
    FetchOptions, fetch_observations, fetch_observations_at, fetch_rows, fetch_rows_at,
    get_air_temp_obs, get_precip_obs, get_prev_air_temp_obs, get_prev_snow_depth_obs,
    get_prior_air_temp_obs, get_snow_depth_obs, get_snowfall_obs, get_swe_obs, get_swe_rows,
};
pub use matrix::{ObservationMatrix, TimeAxis};
pub use model::{BoundingBox, ObservationRequest, ObservationRow, StationRecord, TimeSpec, Variable};
pub use store::{MemoryStore, ObservationStore, PgObservationStore};
