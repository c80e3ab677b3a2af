/// SQL construction for observation requests.
///
/// Builds one parameterized statement per request against the
/// `point.*` observation schema. Every statement returns the same nine
/// columns in the same order, which `store::postgres` decodes:
///
///   obj_id, station_id, name, lon, lat, elevation, recorded_elevation,
///   timestamp, value
///
/// Rows are ordered by (station, timestamp). Values are in source units.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::model::{ObservationRequest, STATION_TABLE, TimeSpec};

/// A typed parameter binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryParam {
    /// Store timestamps are naive UTC.
    Timestamp(NaiveDateTime),
    Float(f64),
    Integer(i32),
}

/// A statement ready to hand to an `ObservationStore`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl StoreQuery {
    fn bind(&mut self, param: QueryParam) -> String {
        self.params.push(param);
        let cast = match param {
            QueryParam::Timestamp(_) => "timestamp",
            QueryParam::Float(_) => "double precision",
            QueryParam::Integer(_) => "integer",
        };
        format!("${}::{}", self.params.len(), cast)
    }
}

fn ts(t: DateTime<Utc>) -> QueryParam {
    QueryParam::Timestamp(t.naive_utc())
}

/// Builds the store query for a request. Pure; performs no validation
/// beyond what the request types already guarantee.
pub fn build_query(request: &ObservationRequest) -> StoreQuery {
    let descriptor = request.variable.descriptor();
    let mut query = StoreQuery {
        sql: String::new(),
        params: Vec::new(),
    };

    let mut sql = format!(
        "SELECT t3.obj_identifier::bigint, \
         TRIM(t3.station_id), \
         TRIM(t3.name), \
         t3.coordinates[0]::double precision AS lon, \
         t3.coordinates[1]::double precision AS lat, \
         t3.elevation::double precision, \
         t3.recorded_elevation::double precision, \
         t2.date, \
         t2.value::double precision \
         FROM {} AS t2 \
         JOIN {} AS t3 ON t3.obj_identifier = t2.obj_identifier ",
        descriptor.table, STATION_TABLE
    );

    if let Some(filter) = request.co_occurrence {
        let anchor = query.bind(ts(request.time_spec.anchor()));
        sql.push_str(&format!(
            "JOIN (SELECT obj_identifier FROM {} \
             WHERE date = {} AND value IS NOT NULL \
             GROUP BY obj_identifier) AS t1 ON t1.obj_identifier = t2.obj_identifier ",
            filter.descriptor().table,
            anchor
        ));
    }

    match request.time_spec {
        TimeSpec::Instant { target, duration_hours } => {
            let at = query.bind(ts(target));
            sql.push_str(&format!("WHERE t2.date = {} ", at));
            if descriptor.has_duration {
                let seconds = query.bind(QueryParam::Integer(duration_seconds(duration_hours)));
                sql.push_str(&format!("AND t2.duration = {} ", seconds));
            }
        }
        TimeSpec::Range { begin, end } => {
            let lo = query.bind(ts(begin));
            let hi = query.bind(ts(end));
            sql.push_str(&format!("WHERE t2.date >= {} AND t2.date <= {} ", lo, hi));
        }
        TimeSpec::Prior { target, hours } => {
            // Up to, not including, the target hour.
            let lo = query.bind(ts(target - Duration::hours(i64::from(hours))));
            let hi = query.bind(ts(target - Duration::hours(1)));
            sql.push_str(&format!("WHERE t2.date >= {} AND t2.date <= {} ", lo, hi));
        }
    }

    sql.push_str("AND t2.value IS NOT NULL ");

    if let Some(bbox) = request.bounding_box {
        let lon_min = query.bind(QueryParam::Float(bbox.lon_min));
        let lon_max = query.bind(QueryParam::Float(bbox.lon_max));
        let lat_min = query.bind(QueryParam::Float(bbox.lat_min));
        let lat_max = query.bind(QueryParam::Float(bbox.lat_max));
        sql.push_str(&format!(
            "AND t3.coordinates[0] >= {} AND t3.coordinates[0] < {} \
             AND t3.coordinates[1] >= {} AND t3.coordinates[1] < {} ",
            lon_min, lon_max, lat_min, lat_max
        ));
    }

    sql.push_str("ORDER BY t2.obj_identifier, t2.date");
    query.sql = sql;
    query
}

/// Duration tags are stored in seconds.
pub fn duration_seconds(hours: u32) -> i32 {
    i32::try_from(u64::from(hours) * 3600).unwrap_or(i32::MAX)
}
