/// Public retrieval functions, one per variable and time shape.
///
/// Every call follows the same path: validate the request, try the cache,
/// otherwise build the query, run it against the store, pivot the rows, and
/// write the result back to the cache when the window is old enough.
///
/// The `*_at` variants take the wall-clock time used by the staleness rule;
/// the plain variants use `Utc::now()`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::cache::{CacheGate, CachePayload};
use crate::error::ObsError;
use crate::logging::{self, DataSource};
use crate::matrix::ObservationMatrix;
use crate::model::{
    BoundingBox, DEFAULT_NO_DATA_VALUE, ObservationRequest, ObservationRow, TimeSpec, Variable,
};
use crate::pivot;
use crate::query;
use crate::store::ObservationStore;

/// Per-call options shared by every retrieval function.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Value reported for masked cells by `ObservationMatrix::filled_values`.
    pub no_data_value: f64,
    /// Restrict to stations inside this box. Disables caching.
    pub bounding_box: Option<BoundingBox>,
    /// Directory for cached results; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Log generated SQL at INFO instead of DEBUG.
    pub verbose: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            no_data_value: DEFAULT_NO_DATA_VALUE,
            bounding_box: None,
            cache_dir: None,
            verbose: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Generic entry points
// ---------------------------------------------------------------------------

pub fn fetch_observations<S: ObservationStore>(
    store: &mut S,
    request: &ObservationRequest,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    fetch_observations_at(store, request, options, Utc::now())
}

pub fn fetch_observations_at<S: ObservationStore>(
    store: &mut S,
    request: &ObservationRequest,
    options: &FetchOptions,
    now: DateTime<Utc>,
) -> Result<ObservationMatrix, ObsError> {
    let mut matrix = cached(store, request, options, now, |rows| {
        let matrix = pivot::pivot_request(request, &rows, options.no_data_value)?;
        let (stations, slots) = matrix.shape();
        logging::log_fetch_summary(
            request.variable.descriptor().label,
            stations,
            slots,
            matrix.masked_count(),
        );
        Ok(matrix)
    })?;
    // Cache entries carry whichever fill value the writer used.
    matrix.no_data_value = options.no_data_value;
    Ok(matrix)
}

/// Unit-converted rows without pivoting, in store order.
pub fn fetch_rows<S: ObservationStore>(
    store: &mut S,
    request: &ObservationRequest,
    options: &FetchOptions,
) -> Result<Vec<ObservationRow>, ObsError> {
    fetch_rows_at(store, request, options, Utc::now())
}

pub fn fetch_rows_at<S: ObservationStore>(
    store: &mut S,
    request: &ObservationRequest,
    options: &FetchOptions,
    now: DateTime<Utc>,
) -> Result<Vec<ObservationRow>, ObsError> {
    let variable = request.variable;
    cached(store, request, options, now, |rows| {
        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.value = variable.convert(row.value);
                row
            })
            .collect())
    })
}

/// Shared cache-gate flow around a store round trip.
fn cached<S, T, F>(
    store: &mut S,
    request: &ObservationRequest,
    options: &FetchOptions,
    now: DateTime<Utc>,
    shape: F,
) -> Result<T, ObsError>
where
    S: ObservationStore,
    T: CachePayload,
    F: FnOnce(Vec<ObservationRow>) -> Result<T, ObsError>,
{
    request.validate()?;

    let gate = CacheGate::new(options.cache_dir.as_deref());
    if let Some(hit) = gate.load::<T>(request) {
        return Ok(hit);
    }

    let built = query::build_query(request);
    logging::log_query(&built.sql, options.verbose);

    let rows = store.fetch_rows(request, &built).map_err(|e| {
        logging::log_store_failure(request.variable.descriptor().label, &e);
        e
    })?;

    let result = shape(rows)?;

    match gate.store_at(request, &result, now) {
        Ok(true) => {
            if let Some(path) = gate.entry_path::<T>(request) {
                let message = format!("wrote query results to {}", path.display());
                if options.verbose {
                    logging::info(DataSource::Cache, &message);
                } else {
                    logging::debug(DataSource::Cache, &message);
                }
            }
        }
        Ok(false) => {}
        Err(e) => logging::warn(DataSource::Cache, &format!("cache write skipped: {}", e)),
    }

    Ok(result)
}

fn with_options(request: ObservationRequest, options: &FetchOptions) -> ObservationRequest {
    request.with_bounding_box(options.bounding_box)
}

// ---------------------------------------------------------------------------
// Hourly windows
// ---------------------------------------------------------------------------

/// Hourly snow depth (cm) for every hour from `begin` through `end`.
pub fn get_snow_depth_obs<S: ObservationStore>(
    store: &mut S,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::SnowDepth, TimeSpec::Range { begin, end });
    fetch_observations(store, &with_options(request, options), options)
}

/// Hourly snow water equivalent (mm) for every hour from `begin` through `end`.
pub fn get_swe_obs<S: ObservationStore>(
    store: &mut S,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::Swe, TimeSpec::Range { begin, end });
    fetch_observations(store, &with_options(request, options), options)
}

/// Hourly SWE rows (mm) without pivoting.
pub fn get_swe_rows<S: ObservationStore>(
    store: &mut S,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &FetchOptions,
) -> Result<Vec<ObservationRow>, ObsError> {
    let request = ObservationRequest::new(Variable::Swe, TimeSpec::Range { begin, end });
    fetch_rows(store, &with_options(request, options), options)
}

/// Hourly air temperature (deg C) for every hour from `begin` through `end`.
pub fn get_air_temp_obs<S: ObservationStore>(
    store: &mut S,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::AirTemp, TimeSpec::Range { begin, end });
    fetch_observations(store, &with_options(request, options), options)
}

// ---------------------------------------------------------------------------
// Hours prior to a target time
// ---------------------------------------------------------------------------

/// Snow depth for the `hours` hours before `target`, limited to stations
/// that report snow depth at `target`.
pub fn get_prev_snow_depth_obs<S: ObservationStore>(
    store: &mut S,
    target: DateTime<Utc>,
    hours: u32,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::SnowDepth, TimeSpec::Prior { target, hours })
        .with_co_occurrence(Variable::SnowDepth);
    fetch_observations(store, &with_options(request, options), options)
}

/// Air temperature for the `hours` hours before `target`, limited to
/// stations that report snow depth at `target`.
pub fn get_prev_air_temp_obs<S: ObservationStore>(
    store: &mut S,
    target: DateTime<Utc>,
    hours: u32,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::AirTemp, TimeSpec::Prior { target, hours })
        .with_co_occurrence(Variable::SnowDepth);
    fetch_observations(store, &with_options(request, options), options)
}

/// Air temperature for the `hours` hours before `target`, all stations.
pub fn get_prior_air_temp_obs<S: ObservationStore>(
    store: &mut S,
    target: DateTime<Utc>,
    hours: u32,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(Variable::AirTemp, TimeSpec::Prior { target, hours });
    fetch_observations(store, &with_options(request, options), options)
}

// ---------------------------------------------------------------------------
// Accumulations ending at a target time
// ---------------------------------------------------------------------------

/// Snowfall (cm) accumulated over `duration_hours` ending at `target`, for
/// stations that report snow depth at `target`.
pub fn get_snowfall_obs<S: ObservationStore>(
    store: &mut S,
    target: DateTime<Utc>,
    duration_hours: u32,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(
        Variable::Snowfall,
        TimeSpec::Instant { target, duration_hours },
    )
    .with_co_occurrence(Variable::SnowDepth);
    fetch_observations(store, &with_options(request, options), options)
}

/// Precipitation (mm) accumulated over `duration_hours` ending at `target`,
/// for stations that report snow depth at `target`.
pub fn get_precip_obs<S: ObservationStore>(
    store: &mut S,
    target: DateTime<Utc>,
    duration_hours: u32,
    options: &FetchOptions,
) -> Result<ObservationMatrix, ObsError> {
    let request = ObservationRequest::new(
        Variable::Precip,
        TimeSpec::Instant { target, duration_hours },
    )
    .with_co_occurrence(Variable::SnowDepth);
    fetch_observations(store, &with_options(request, options), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StationRecord;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 1, h, 0, 0).unwrap()
    }

    fn row(obj_id: i64, h: u32, value: f64) -> ObservationRow {
        ObservationRow {
            station: StationRecord {
                obj_id,
                station_id: format!("S{}", obj_id),
                name: String::new(),
                lon: -100.0,
                lat: 45.0,
                elevation: None,
                recorded_elevation: None,
            },
            timestamp: hour(h),
            value,
        }
    }

    #[test]
    fn test_default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.no_data_value, -99999.0);
        assert!(options.bounding_box.is_none());
        assert!(options.cache_dir.is_none());
        assert!(!options.verbose);
    }

    #[test]
    fn test_invalid_request_never_reaches_store() {
        let mut store = MemoryStore::new();
        let result = get_snow_depth_obs(&mut store, hour(5), hour(1), &FetchOptions::default());
        assert!(matches!(result, Err(ObsError::InvalidRequest(_))));
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_swe_rows_are_converted_to_mm() {
        let mut store = MemoryStore::new();
        store.insert(Variable::Swe, vec![row(1, 0, 0.0123), row(1, 1, 0.05)]);
        let rows = get_swe_rows(&mut store, hour(0), hour(1), &FetchOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].value - 12.3).abs() < 1e-9);
        assert!((rows[1].value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_snowfall_limited_to_stations_reporting_depth() {
        let mut store = MemoryStore::new();
        store.insert(Variable::Snowfall, vec![row(1, 12, 0.05), row(2, 12, 0.10)]);
        store.insert(Variable::SnowDepth, vec![row(2, 12, 0.40)]);
        let m = get_snowfall_obs(&mut store, hour(12), 24, &FetchOptions::default()).unwrap();
        assert_eq!(m.shape(), (1, 1));
        assert_eq!(m.stations[0].obj_id, 2);
        assert_eq!(m.get(0, 0), Some(10.0));
    }

    #[test]
    fn test_prior_air_temp_covers_hours_before_target() {
        let mut store = MemoryStore::new();
        store.insert(Variable::AirTemp, vec![row(1, 2, -1.5), row(1, 5, -3.0), row(1, 6, -4.0)]);
        let m = get_prior_air_temp_obs(&mut store, hour(6), 6, &FetchOptions::default()).unwrap();
        assert_eq!(m.shape(), (1, 6));
        assert_eq!(m.get(0, 2), Some(-1.5));
        assert_eq!(m.get(0, 5), Some(-3.0));
        assert_eq!(m.masked_count(), 4);
    }
}
