/// Pivot behaviour seen through the public API.
///
/// These tests verify:
/// 1. Range matrices have floor((end-begin)/1h) + 1 slots and one row per station
/// 2. Cells without a row are masked, never zero or uninitialized
/// 3. Station order is stable and does not depend on row grouping
/// 4. Unit conversion from source meters
/// 5. Integrity faults surface as typed errors

use chrono::{DateTime, Duration, TimeZone, Utc};

use snowobs_service::matrix::TimeAxis;
use snowobs_service::pivot::pivot;
use snowobs_service::{
    FetchOptions, MemoryStore, ObsError, ObservationRow, PivotError, StationRecord, Variable,
    get_air_temp_obs, get_snow_depth_obs,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn hour(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
}

fn station(obj_id: i64, code: &str) -> StationRecord {
    StationRecord {
        obj_id,
        station_id: code.to_string(),
        name: format!("{} test site", code),
        lon: -106.5,
        lat: 39.8,
        elevation: Some(3100.0),
        recorded_elevation: Some(3098.5),
    }
}

/// A row with a value in source meters.
fn row(obj_id: i64, code: &str, h: i64, meters: f64) -> ObservationRow {
    ObservationRow {
        station: station(obj_id, code),
        timestamp: hour(h),
        value: meters,
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

#[test]
fn test_two_stations_three_hours_scenario() {
    // A at h0 = 12 cm, A at h2 = 15 cm, B at h1 = 3 cm.
    let rows = vec![
        row(101, "A", 0, 0.12),
        row(101, "A", 2, 0.15),
        row(202, "B", 1, 0.03),
    ];
    let m = pivot(Variable::SnowDepth, TimeAxis::hourly(hour(0), hour(2)), &rows, -99999.0)
        .expect("rows fit the window");

    assert_eq!(m.shape(), (2, 3));
    assert_eq!(m.stations[0].station_id, "A");
    assert_eq!(m.stations[1].station_id, "B");

    let a = m.row(0).unwrap();
    assert!((a[0].unwrap() - 12.0).abs() < 1e-9);
    assert_eq!(a[1], None);
    assert!((a[2].unwrap() - 15.0).abs() < 1e-9);

    let b = m.row(1).unwrap();
    assert_eq!(b[0], None);
    assert!((b[1].unwrap() - 3.0).abs() < 1e-9);
    assert_eq!(b[2], None);
    assert!(m.row(2).is_none());

    let filled = m.filled_values();
    assert_eq!(filled[1][0], -99999.0);
    assert_eq!(filled[1][2], -99999.0);
}

#[test]
fn test_range_shape_matches_window_length() {
    for (begin, end) in [(0, 0), (0, 23), (5, 100), (0, 743)] {
        let axis = TimeAxis::hourly(hour(begin), hour(end));
        let rows = vec![row(1, "A", begin, 0.1), row(2, "B", end, 0.2)];
        let m = pivot(Variable::SnowDepth, axis, &rows, -99999.0).unwrap();
        let expected_hours = (end - begin + 1) as usize;
        assert_eq!(m.num_hours(), expected_hours);
        assert_eq!(m.timestamps().len(), expected_hours);
        assert_eq!(m.shape(), (2, expected_hours));
    }
}

#[test]
fn test_empty_rows_give_all_masked_matrix() {
    let mut store = MemoryStore::new();
    let m = get_snow_depth_obs(&mut store, hour(0), hour(47), &FetchOptions::default())
        .expect("no data is not an error");
    assert_eq!(m.shape(), (0, 48));
    assert_eq!(m.masked_count(), 0);
    assert!(m.filled_values().is_empty());
    assert_eq!(m.timestamps()[47], hour(47));
}

#[test]
fn test_zero_reading_is_not_masked() {
    let rows = vec![row(1, "A", 0, 0.0)];
    let m = pivot(Variable::SnowDepth, TimeAxis::hourly(hour(0), hour(1)), &rows, -99999.0)
        .unwrap();
    assert_eq!(m.get(0, 0), Some(0.0));
    assert!(m.is_masked(0, 1));
}

// ---------------------------------------------------------------------------
// Ordering and determinism
// ---------------------------------------------------------------------------

#[test]
fn test_pivot_is_deterministic() {
    let rows = vec![
        row(1, "A", 0, 0.5),
        row(1, "A", 3, 0.6),
        row(2, "B", 1, 0.7),
        row(3, "C", 2, 0.8),
    ];
    let axis = TimeAxis::hourly(hour(0), hour(3));
    let first = pivot(Variable::Swe, axis, &rows, -99999.0).unwrap();
    let second = pivot(Variable::Swe, axis, &rows, -99999.0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_interleaved_rows_pivot_like_grouped_rows() {
    let grouped = vec![
        row(1, "A", 0, 0.10),
        row(1, "A", 1, 0.11),
        row(2, "B", 0, 0.20),
        row(2, "B", 1, 0.21),
    ];
    let interleaved = vec![
        row(1, "A", 0, 0.10),
        row(2, "B", 0, 0.20),
        row(1, "A", 1, 0.11),
        row(2, "B", 1, 0.21),
    ];
    let axis = TimeAxis::hourly(hour(0), hour(1));
    let a = pivot(Variable::SnowDepth, axis, &grouped, -99999.0).unwrap();
    let b = pivot(Variable::SnowDepth, axis, &interleaved, -99999.0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.num_stations(), 2);
}

#[test]
fn test_station_metadata_is_carried_through() {
    let rows = vec![row(77, "CSSL", 0, 1.5)];
    let m = pivot(Variable::SnowDepth, TimeAxis::hourly(hour(0), hour(0)), &rows, -99999.0)
        .unwrap();
    assert_eq!(m.stations[0], station(77, "CSSL"));
    assert_eq!(m.station_index(77), Some(0));
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[test]
fn test_depth_meters_become_centimeters() {
    let rows = vec![row(1, "A", 0, 0.254)];
    let m = pivot(Variable::SnowDepth, TimeAxis::hourly(hour(0), hour(0)), &rows, -99999.0)
        .unwrap();
    assert!((m.get(0, 0).unwrap() - 25.4).abs() < 1e-9);
    assert_eq!(m.unit(), "cm");
}

#[test]
fn test_air_temperature_is_not_scaled() {
    let mut store = MemoryStore::new();
    store.insert(Variable::AirTemp, vec![row(1, "A", 1, -7.25)]);
    let m = get_air_temp_obs(&mut store, hour(0), hour(2), &FetchOptions::default()).unwrap();
    assert_eq!(m.get(0, 1), Some(-7.25));
    assert_eq!(m.unit(), "deg_c");
}

// ---------------------------------------------------------------------------
// Integrity faults
// ---------------------------------------------------------------------------

#[test]
fn test_out_of_window_row_reports_context() {
    let rows = vec![row(1, "A", 0, 0.1), row(9, "Z", 5, 0.2)];
    let err = pivot(Variable::SnowDepth, TimeAxis::hourly(hour(0), hour(2)), &rows, -99999.0)
        .unwrap_err();
    match err {
        PivotError::SlotOutOfRange { obj_id, station_id, slot, shape, .. } => {
            assert_eq!(obj_id, 9);
            assert_eq!(station_id, "Z");
            assert_eq!(slot, 5);
            assert_eq!(shape, (2, 3));
        }
        other => panic!("expected SlotOutOfRange, got {:?}", other),
    }
}

#[test]
fn test_integrity_fault_is_catchable_obs_error() {
    // A store that ignores the window: the fault comes back as a value.
    struct SloppyStore;
    impl snowobs_service::ObservationStore for SloppyStore {
        fn fetch_rows(
            &mut self,
            _request: &snowobs_service::ObservationRequest,
            _query: &snowobs_service::query::StoreQuery,
        ) -> Result<Vec<ObservationRow>, snowobs_service::StoreError> {
            Ok(vec![row(1, "A", 30, 0.1)])
        }
    }

    let result = get_snow_depth_obs(&mut SloppyStore, hour(0), hour(2), &FetchOptions::default());
    assert!(matches!(result, Err(ObsError::Pivot(PivotError::SlotOutOfRange { .. }))));
}
