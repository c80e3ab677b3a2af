/// Core data types for the point-observation service.
///
/// This module defines the shared domain model imported by all other modules:
/// the observation variables and their descriptors, station metadata, raw
/// store rows, and the request shape. It contains no I/O.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ObsError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fill value reported for masked cells unless the caller supplies another.
pub const DEFAULT_NO_DATA_VALUE: f64 = -99999.0;

/// Results whose window ended more than this many days ago are treated as
/// final upstream and may be cached.
pub const STALENESS_THRESHOLD_DAYS: i64 = 60;

/// Station metadata table shared by every observation variable.
pub const STATION_TABLE: &str = "point.allstation";

// ---------------------------------------------------------------------------
// Observation variables
// ---------------------------------------------------------------------------

/// The observation variables held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    SnowDepth,
    Swe,
    AirTemp,
    Snowfall,
    Precip,
}

/// Everything that differs between variables. One generic query builder,
/// pivoter and cache gate consume this instead of per-variable copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableDescriptor {
    /// Fully qualified source table.
    pub table: &'static str,
    /// Multiplier from source units (meters, degrees C) to output units.
    pub scale: f64,
    /// Output unit label.
    pub unit: &'static str,
    /// Name of the value field in the output record.
    pub field: &'static str,
    /// Label used in cache file names.
    pub label: &'static str,
    /// Rows carry an accumulation `duration` column, in seconds.
    pub has_duration: bool,
}

static SNOW_DEPTH: VariableDescriptor = VariableDescriptor {
    table: "point.obs_snow_depth",
    scale: 100.0,
    unit: "cm",
    field: "values_cm",
    label: "snow_depth",
    has_duration: false,
};

static SWE: VariableDescriptor = VariableDescriptor {
    table: "point.obs_swe",
    scale: 1000.0,
    unit: "mm",
    field: "values_mm",
    label: "snow_water_equivalent",
    has_duration: false,
};

static AIR_TEMP: VariableDescriptor = VariableDescriptor {
    table: "point.obs_airtemp",
    scale: 1.0,
    unit: "deg_c",
    field: "values_deg_c",
    label: "air_temp",
    has_duration: false,
};

static SNOWFALL: VariableDescriptor = VariableDescriptor {
    table: "point.obs_snowfall_raw",
    scale: 100.0,
    unit: "cm",
    field: "values_cm",
    label: "snowfall",
    has_duration: true,
};

static PRECIP: VariableDescriptor = VariableDescriptor {
    table: "point.obs_precip_raw",
    scale: 1000.0,
    unit: "mm",
    field: "values_mm",
    label: "precipitation",
    has_duration: true,
};

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::SnowDepth,
        Variable::Swe,
        Variable::AirTemp,
        Variable::Snowfall,
        Variable::Precip,
    ];

    pub fn descriptor(self) -> &'static VariableDescriptor {
        match self {
            Variable::SnowDepth => &SNOW_DEPTH,
            Variable::Swe => &SWE,
            Variable::AirTemp => &AIR_TEMP,
            Variable::Snowfall => &SNOWFALL,
            Variable::Precip => &PRECIP,
        }
    }

    /// Converts a raw store value (source units) to the output unit.
    pub fn convert(self, raw: f64) -> f64 {
        raw * self.descriptor().scale
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.descriptor().label)
    }
}

// ---------------------------------------------------------------------------
// Stations and rows
// ---------------------------------------------------------------------------

/// Metadata for one observing station, as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    /// Stable store key.
    pub obj_id: i64,
    pub station_id: String,
    pub name: String,
    /// WGS84 longitude, degrees.
    pub lon: f64,
    /// WGS84 latitude, degrees.
    pub lat: f64,
    /// Meters. Not every station has a surveyed elevation.
    pub elevation: Option<f64>,
    pub recorded_elevation: Option<f64>,
}

/// One row of the store contract: a station, an observation time and a value.
///
/// Rows returned by an `ObservationStore` hold values in source units;
/// rows returned by `fetch::fetch_rows` hold converted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub station: StationRecord,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Half-open geographic rectangle: `lon in [lon_min, lon_max)`,
/// `lat in [lat_min, lat_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
        Self { lon_min, lon_max, lat_min, lat_max }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon < self.lon_max && lat >= self.lat_min && lat < self.lat_max
    }

    fn validate(&self) -> Result<(), ObsError> {
        let all_finite = [self.lon_min, self.lon_max, self.lat_min, self.lat_max]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite || self.lon_min >= self.lon_max || self.lat_min >= self.lat_max {
            return Err(ObsError::InvalidRequest(format!(
                "bounding box must satisfy lon_min < lon_max and lat_min < lat_max, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// What period a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSpec {
    /// Every hour from `begin` through `end`, both inclusive.
    Range {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// The `hours` hourly slots strictly before `target`.
    Prior { target: DateTime<Utc>, hours: u32 },
    /// A single observation time carrying an accumulation duration.
    Instant {
        target: DateTime<Utc>,
        duration_hours: u32,
    },
}

impl TimeSpec {
    /// The inclusive hourly bounds scanned by the query, or `None` for
    /// instant requests.
    pub fn hourly_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match *self {
            TimeSpec::Range { begin, end } => Some((begin, end)),
            TimeSpec::Prior { target, hours } => Some((
                target - Duration::hours(i64::from(hours)),
                target - Duration::hours(1),
            )),
            TimeSpec::Instant { .. } => None,
        }
    }

    /// Last instant covered by the request; drives the staleness rule.
    pub fn window_end(&self) -> DateTime<Utc> {
        match *self {
            TimeSpec::Range { end, .. } => end,
            TimeSpec::Prior { target, .. } => target - Duration::hours(1),
            TimeSpec::Instant { target, .. } => target,
        }
    }

    /// Instant at which a co-occurrence filter is evaluated.
    pub fn anchor(&self) -> DateTime<Utc> {
        match *self {
            TimeSpec::Range { end, .. } => end,
            TimeSpec::Prior { target, .. } => target,
            TimeSpec::Instant { target, .. } => target,
        }
    }

    fn validate(&self) -> Result<(), ObsError> {
        match *self {
            TimeSpec::Range { begin, end } if begin > end => Err(ObsError::InvalidRequest(
                format!("range begin {} is after end {}", begin, end),
            )),
            TimeSpec::Prior { hours: 0, .. } => Err(ObsError::InvalidRequest(
                "prior-hours request needs at least one hour".to_string(),
            )),
            TimeSpec::Instant { duration_hours: 0, .. } => Err(ObsError::InvalidRequest(
                "instant request needs a positive duration".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// A complete, store-independent description of one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRequest {
    pub variable: Variable,
    pub time_spec: TimeSpec,
    pub bounding_box: Option<BoundingBox>,
    /// Only stations with a non-null reading of this variable at the
    /// request's anchor instant are included.
    pub co_occurrence: Option<Variable>,
}

impl ObservationRequest {
    pub fn new(variable: Variable, time_spec: TimeSpec) -> Self {
        Self {
            variable,
            time_spec,
            bounding_box: None,
            co_occurrence: None,
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: Option<BoundingBox>) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    pub fn with_co_occurrence(mut self, filter: Variable) -> Self {
        self.co_occurrence = Some(filter);
        self
    }

    pub fn validate(&self) -> Result<(), ObsError> {
        self.time_spec.validate()?;
        if let Some(bbox) = &self.bounding_box {
            bbox.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
