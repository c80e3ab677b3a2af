/// The pivoted station-by-time result.
///
/// Cells are `Option<f64>`: `None` is a masked cell (no observation), which
/// is never confused with a real reading. The caller's fill value is kept
/// alongside and only applied by `filled_values`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{StationRecord, Variable};

/// Time dimension of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeAxis {
    /// Slot `i` is `begin + i hours`.
    Hourly {
        begin: DateTime<Utc>,
        num_hours: usize,
    },
    /// A single slot at `at`.
    Instant {
        at: DateTime<Utc>,
        duration_hours: u32,
    },
}

impl TimeAxis {
    /// Builds the hourly axis for an inclusive window:
    /// `floor((end - begin) / 1h) + 1` slots.
    pub fn hourly(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let num_hours = ((end - begin).num_hours() + 1).max(0) as usize;
        TimeAxis::Hourly { begin, num_hours }
    }

    pub fn len(&self) -> usize {
        match self {
            TimeAxis::Hourly { num_hours, .. } => *num_hours,
            TimeAxis::Instant { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        match *self {
            TimeAxis::Hourly { begin, num_hours } => (0..num_hours)
                .map(|i| begin + Duration::hours(i as i64))
                .collect(),
            TimeAxis::Instant { at, .. } => vec![at],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationMatrix {
    pub variable: Variable,
    pub stations: Vec<StationRecord>,
    pub time_axis: TimeAxis,
    /// Value reported for masked cells by `filled_values`.
    pub no_data_value: f64,
    /// Row-major `[station][slot]`.
    values: Vec<Option<f64>>,
}

impl ObservationMatrix {
    /// An all-masked matrix with no stations.
    pub fn empty(variable: Variable, time_axis: TimeAxis, no_data_value: f64) -> Self {
        Self {
            variable,
            stations: Vec::new(),
            time_axis,
            no_data_value,
            values: Vec::new(),
        }
    }

    /// Appends a station with an all-masked row and returns its index.
    pub(crate) fn push_station(&mut self, station: StationRecord) -> usize {
        self.stations.push(station);
        self.values
            .extend(std::iter::repeat_n(None, self.time_axis.len()));
        self.stations.len() - 1
    }

    pub(crate) fn set(&mut self, station: usize, slot: usize, value: f64) {
        let width = self.time_axis.len();
        self.values[station * width + slot] = Some(value);
    }

    pub fn num_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn num_hours(&self) -> usize {
        self.time_axis.len()
    }

    /// `(stations, slots)`. Instant matrices have one slot.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_stations(), self.num_hours())
    }

    pub fn unit(&self) -> &'static str {
        self.variable.descriptor().unit
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.time_axis.timestamps()
    }

    /// `None` for masked cells and for indices outside the matrix.
    pub fn get(&self, station: usize, slot: usize) -> Option<f64> {
        let (rows, cols) = self.shape();
        if station >= rows || slot >= cols {
            return None;
        }
        self.values[station * cols + slot]
    }

    pub fn is_masked(&self, station: usize, slot: usize) -> bool {
        self.get(station, slot).is_none()
    }

    /// One station's cells, or `None` past the last station.
    pub fn row(&self, station: usize) -> Option<&[Option<f64>]> {
        (station < self.num_stations()).then(|| self.cells(station))
    }

    fn cells(&self, station: usize) -> &[Option<f64>] {
        let width = self.num_hours();
        &self.values[station * width..(station + 1) * width]
    }

    pub fn station_index(&self, obj_id: i64) -> Option<usize> {
        self.stations.iter().position(|s| s.obj_id == obj_id)
    }

    /// Dense view with masked cells replaced by `no_data_value`.
    pub fn filled_values(&self) -> Vec<Vec<f64>> {
        (0..self.num_stations())
            .map(|s| {
                self.cells(s)
                    .iter()
                    .map(|v| v.unwrap_or(self.no_data_value))
                    .collect()
            })
            .collect()
    }

    /// Parallel view of the mask: `true` where the cell has no data.
    pub fn mask(&self) -> Vec<Vec<bool>> {
        (0..self.num_stations())
            .map(|s| self.cells(s).iter().map(Option::is_none).collect())
            .collect()
    }

    pub fn masked_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Checks the shape invariant. Used on matrices read back from disk.
    pub fn validate(&self) -> Result<(), String> {
        let expected = self.num_stations() * self.num_hours();
        if self.values.len() != expected {
            return Err(format!(
                "{} cells for shape {:?}, expected {}",
                self.values.len(),
                self.shape(),
                expected
            ));
        }
        Ok(())
    }
}
