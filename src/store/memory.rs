//! In-memory observation store for testing and offline use.
//!
//! Answers requests by filtering rows held per variable, following the same
//! contract as the SQL store: inclusive time window, half-open bounding box,
//! co-occurrence restriction, and (station, timestamp) ordering. Counts
//! queries so callers can check whether the cache spared a round trip.

use std::collections::{HashMap, HashSet};

use crate::error::StoreError;
use crate::model::{ObservationRequest, ObservationRow, TimeSpec, Variable};
use crate::query::StoreQuery;
use crate::store::ObservationStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: HashMap<Variable, Vec<ObservationRow>>,
    queries: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds raw (source unit) rows for a variable.
    pub fn insert(&mut self, variable: Variable, rows: impl IntoIterator<Item = ObservationRow>) {
        self.rows.entry(variable).or_default().extend(rows);
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries
    }

    fn stations_reporting(&self, variable: Variable, at: chrono::DateTime<chrono::Utc>) -> HashSet<i64> {
        self.rows
            .get(&variable)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.timestamp == at)
                    .map(|r| r.station.obj_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ObservationStore for MemoryStore {
    fn fetch_rows(
        &mut self,
        request: &ObservationRequest,
        _query: &StoreQuery,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.queries += 1;

        let allowed = request
            .co_occurrence
            .map(|filter| self.stations_reporting(filter, request.time_spec.anchor()));

        let in_window = |row: &ObservationRow| match request.time_spec {
            TimeSpec::Instant { target, .. } => row.timestamp == target,
            _ => request
                .time_spec
                .hourly_bounds()
                .is_some_and(|(begin, end)| row.timestamp >= begin && row.timestamp <= end),
        };

        let mut rows: Vec<ObservationRow> = self
            .rows
            .get(&request.variable)
            .map(|rows| {
                rows.iter()
                    .filter(|r| in_window(*r))
                    .filter(|r| {
                        request
                            .bounding_box
                            .is_none_or(|b| b.contains(r.station.lon, r.station.lat))
                    })
                    .filter(|r| allowed.as_ref().is_none_or(|ids| ids.contains(&r.station.obj_id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by_key(|r| (r.station.obj_id, r.timestamp));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, StationRecord};
    use crate::query::build_query;
    use chrono::{DateTime, TimeZone, Utc};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 1, h, 0, 0).unwrap()
    }

    fn row(obj_id: i64, lon: f64, h: u32, value: f64) -> ObservationRow {
        ObservationRow {
            station: StationRecord {
                obj_id,
                station_id: format!("S{}", obj_id),
                name: String::new(),
                lon,
                lat: 45.0,
                elevation: None,
                recorded_elevation: None,
            },
            timestamp: hour(h),
            value,
        }
    }

    fn fetch(store: &mut MemoryStore, request: &ObservationRequest) -> Vec<ObservationRow> {
        store.fetch_rows(request, &build_query(request)).unwrap()
    }

    #[test]
    fn test_rows_come_back_sorted_by_station_then_time() {
        let mut store = MemoryStore::new();
        store.insert(
            Variable::SnowDepth,
            vec![row(2, -100.0, 1, 0.1), row(1, -100.0, 2, 0.2), row(1, -100.0, 0, 0.3)],
        );
        let request = ObservationRequest::new(
            Variable::SnowDepth,
            TimeSpec::Range { begin: hour(0), end: hour(2) },
        );
        let rows = fetch(&mut store, &request);
        let keys: Vec<_> = rows.iter().map(|r| (r.station.obj_id, r.timestamp)).collect();
        assert_eq!(keys, vec![(1, hour(0)), (1, hour(2)), (2, hour(1))]);
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn test_bounding_box_and_co_occurrence_filters() {
        let mut store = MemoryStore::new();
        store.insert(
            Variable::AirTemp,
            vec![row(1, -105.0, 3, -2.0), row(2, -105.0, 3, -4.0), row(3, -95.0, 3, 1.0)],
        );
        store.insert(Variable::SnowDepth, vec![row(1, -105.0, 4, 0.5), row(3, -95.0, 4, 0.1)]);

        let request = ObservationRequest::new(
            Variable::AirTemp,
            TimeSpec::Prior { target: hour(4), hours: 4 },
        )
        .with_co_occurrence(Variable::SnowDepth)
        .with_bounding_box(Some(BoundingBox::new(-110.0, -100.0, 40.0, 50.0)));

        let rows = fetch(&mut store, &request);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].station.obj_id, 1);
    }
}
