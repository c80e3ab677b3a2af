/// PostgreSQL observation store.
///
/// Connects lazily on the first query, so a request answered from the cache
/// never opens a connection. Every session gets a server-side
/// `statement_timeout`; a hung query fails instead of blocking forever.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls, Row};

use crate::error::StoreError;
use crate::logging::{self, DataSource};
use crate::model::{ObservationRequest, ObservationRow, StationRecord};
use crate::query::{QueryParam, StoreQuery};
use crate::store::ObservationStore;

pub struct PgObservationStore {
    config: Config,
    client: Option<Client>,
}

impl PgObservationStore {
    /// Builds a store from connection settings. No connection is made yet.
    ///
    /// # Arguments
    /// * `config` - host, database, user and connect timeout
    /// * `statement_timeout` - server-side limit applied to every query
    pub fn new(mut config: Config, statement_timeout: Option<Duration>) -> Self {
        if let Some(limit) = statement_timeout {
            config.options(&format!("-c statement_timeout={}", limit.as_millis()));
        }
        Self {
            config,
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn client(&mut self) -> Result<&mut Client, StoreError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                let client = self.config.connect(NoTls).map_err(StoreError::Connect)?;
                logging::debug(DataSource::Database, "connected to observation store");
                client
            }
        };
        Ok(self.client.insert(client))
    }
}

impl ObservationStore for PgObservationStore {
    fn fetch_rows(
        &mut self,
        _request: &ObservationRequest,
        query: &StoreQuery,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let params: Vec<&(dyn ToSql + Sync)> = query
            .params
            .iter()
            .map(|p| match p {
                QueryParam::Timestamp(t) => t as &(dyn ToSql + Sync),
                QueryParam::Float(v) => v as &(dyn ToSql + Sync),
                QueryParam::Integer(v) => v as &(dyn ToSql + Sync),
            })
            .collect();

        let rows = self
            .client()?
            .query(query.sql.as_str(), &params)
            .map_err(StoreError::Query)?;

        rows.iter().map(decode_row).collect()
    }
}

fn column<'a, T: postgres::types::FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    name: &'static str,
) -> Result<T, StoreError> {
    row.try_get(idx).map_err(|source| StoreError::Row {
        column: name,
        source,
    })
}

/// Decodes the nine-column shape produced by `query::build_query`.
fn decode_row(row: &Row) -> Result<ObservationRow, StoreError> {
    let name: Option<String> = column(row, 2, "name")?;
    let date: NaiveDateTime = column(row, 7, "date")?;
    Ok(ObservationRow {
        station: StationRecord {
            obj_id: column(row, 0, "obj_identifier")?,
            station_id: column(row, 1, "station_id")?,
            name: name.unwrap_or_default(),
            lon: column(row, 3, "lon")?,
            lat: column(row, 4, "lat")?,
            elevation: column(row, 5, "elevation")?,
            recorded_elevation: column(row, 6, "recorded_elevation")?,
        },
        timestamp: DateTime::<Utc>::from_naive_utc_and_offset(date, Utc),
        value: column(row, 8, "value")?,
    })
}
