/// Row-to-matrix pivoting.
///
/// The store is asked for rows sorted by (station, time), but the pivot
/// does not rely on it: rows are grouped by station object id first, with
/// stations kept in order of first appearance. Sorted input therefore
/// gives the same station order the store returned.

use chrono::Duration;
use indexmap::IndexMap;

use crate::error::PivotError;
use crate::matrix::{ObservationMatrix, TimeAxis};
use crate::model::{ObservationRequest, ObservationRow, StationRecord, TimeSpec, Variable};

/// The axis a request pivots onto.
pub fn time_axis_for(time_spec: &TimeSpec) -> TimeAxis {
    match *time_spec {
        TimeSpec::Instant { target, duration_hours } => TimeAxis::Instant {
            at: target,
            duration_hours,
        },
        TimeSpec::Range { begin, end } => TimeAxis::hourly(begin, end),
        TimeSpec::Prior { target, hours } => TimeAxis::Hourly {
            begin: target - Duration::hours(i64::from(hours)),
            num_hours: hours as usize,
        },
    }
}

/// Pivots rows for `request` into a matrix.
pub fn pivot_request(
    request: &ObservationRequest,
    rows: &[ObservationRow],
    no_data_value: f64,
) -> Result<ObservationMatrix, PivotError> {
    pivot(request.variable, time_axis_for(&request.time_spec), rows, no_data_value)
}

/// Pivots raw store rows onto `axis`, converting values to the variable's
/// output unit.
///
/// Every cell not matched by a row is masked. A row that lands outside the
/// axis is a `PivotError`; nothing is dropped silently. When several rows hit
/// the same cell the later one wins.
pub fn pivot(
    variable: Variable,
    axis: TimeAxis,
    rows: &[ObservationRow],
    no_data_value: f64,
) -> Result<ObservationMatrix, PivotError> {
    let groups = group_by_station(rows);
    let mut matrix = ObservationMatrix::empty(variable, axis, no_data_value);
    let num_stations = groups.len();

    for (station, station_rows) in groups {
        let station_index = matrix.push_station(station.clone());
        for row in station_rows {
            let slot = slot_index(&axis, row, num_stations)?;
            matrix.set(station_index, slot, variable.convert(row.value));
        }
    }

    Ok(matrix)
}

/// Groups rows by station object id, in order of first appearance. The
/// station record is taken from each station's first row.
pub fn group_by_station(rows: &[ObservationRow]) -> Vec<(&StationRecord, Vec<&ObservationRow>)> {
    let mut groups: IndexMap<i64, (&StationRecord, Vec<&ObservationRow>)> = IndexMap::new();
    for row in rows {
        groups
            .entry(row.station.obj_id)
            .or_insert_with(|| (&row.station, Vec::new()))
            .1
            .push(row);
    }
    groups.into_values().collect()
}

fn slot_index(
    axis: &TimeAxis,
    row: &ObservationRow,
    num_stations: usize,
) -> Result<usize, PivotError> {
    match *axis {
        TimeAxis::Instant { at, .. } => {
            if row.timestamp != at {
                return Err(PivotError::InstantMismatch {
                    obj_id: row.station.obj_id,
                    station_id: row.station.station_id.clone(),
                    timestamp: row.timestamp,
                    expected: at,
                });
            }
            Ok(0)
        }
        TimeAxis::Hourly { begin, num_hours } => {
            let offset = row.timestamp - begin;
            if offset != Duration::hours(offset.num_hours()) {
                return Err(PivotError::Misaligned {
                    obj_id: row.station.obj_id,
                    station_id: row.station.station_id.clone(),
                    timestamp: row.timestamp,
                    begin,
                });
            }
            let slot = offset.num_seconds().div_euclid(Duration::hours(1).num_seconds());
            if slot < 0 || slot >= num_hours as i64 {
                return Err(PivotError::SlotOutOfRange {
                    obj_id: row.station.obj_id,
                    station_id: row.station.station_id.clone(),
                    timestamp: row.timestamp,
                    slot,
                    shape: (num_stations, num_hours),
                });
            }
            Ok(slot as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn station(obj_id: i64, code: &str) -> StationRecord {
        StationRecord {
            obj_id,
            station_id: code.to_string(),
            name: format!("{} station", code),
            lon: -105.0,
            lat: 40.0,
            elevation: Some(2500.0),
            recorded_elevation: Some(2498.0),
        }
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 1, h, 0, 0).unwrap()
    }

    fn row(obj_id: i64, code: &str, h: u32, meters: f64) -> ObservationRow {
        ObservationRow {
            station: station(obj_id, code),
            timestamp: hour(h),
            value: meters,
        }
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let rows = vec![row(9, "Z", 0, 0.1), row(3, "C", 0, 0.2), row(9, "Z", 1, 0.3)];
        let groups = group_by_station(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.obj_id, 9);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0.obj_id, 3);
    }

    #[test]
    fn test_row_before_window_is_out_of_range() {
        let rows = vec![row(1, "A", 0, 0.1)];
        let axis = TimeAxis::hourly(hour(1), hour(3));
        let err = pivot(Variable::SnowDepth, axis, &rows, -99999.0).unwrap_err();
        assert_eq!(
            err,
            PivotError::SlotOutOfRange {
                obj_id: 1,
                station_id: "A".to_string(),
                timestamp: hour(0),
                slot: -1,
                shape: (1, 3),
            }
        );
    }

    #[test]
    fn test_row_after_window_is_out_of_range() {
        let rows = vec![row(1, "A", 5, 0.1)];
        let axis = TimeAxis::hourly(hour(0), hour(2));
        let err = pivot(Variable::SnowDepth, axis, &rows, -99999.0).unwrap_err();
        assert!(matches!(err, PivotError::SlotOutOfRange { slot: 5, .. }));
    }

    #[test]
    fn test_unaligned_row_is_rejected() {
        let mut r = row(1, "A", 1, 0.1);
        r.timestamp = r.timestamp + Duration::minutes(20);
        let axis = TimeAxis::hourly(hour(0), hour(2));
        let err = pivot(Variable::SnowDepth, axis, &[r], -99999.0).unwrap_err();
        assert!(matches!(err, PivotError::Misaligned { .. }));
    }

    #[test]
    fn test_instant_pivot_has_single_slot() {
        let rows = vec![row(1, "A", 12, 0.05), row(2, "B", 12, 0.0)];
        let axis = TimeAxis::Instant { at: hour(12), duration_hours: 24 };
        let m = pivot(Variable::Snowfall, axis, &rows, -99999.0).unwrap();
        assert_eq!(m.shape(), (2, 1));
        assert_eq!(m.get(0, 0), Some(5.0));
        assert_eq!(m.get(1, 0), Some(0.0));
    }

    #[test]
    fn test_instant_pivot_rejects_other_times() {
        let rows = vec![row(1, "A", 11, 0.05)];
        let axis = TimeAxis::Instant { at: hour(12), duration_hours: 24 };
        let err = pivot(Variable::Snowfall, axis, &rows, -99999.0).unwrap_err();
        assert!(matches!(err, PivotError::InstantMismatch { .. }));
    }

    #[test]
    fn test_duplicate_cell_keeps_later_row() {
        let rows = vec![row(1, "A", 0, 0.10), row(1, "A", 0, 0.20)];
        let axis = TimeAxis::hourly(hour(0), hour(0));
        let m = pivot(Variable::SnowDepth, axis, &rows, -99999.0).unwrap();
        assert_eq!(m.get(0, 0), Some(20.0));
    }

    #[test]
    fn test_prior_axis_ends_one_hour_before_target() {
        let axis = time_axis_for(&TimeSpec::Prior { target: hour(6), hours: 6 });
        assert_eq!(axis, TimeAxis::Hourly { begin: hour(0), num_hours: 6 });
    }
}
