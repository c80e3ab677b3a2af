//! Observation store access.
//!
//! `ObservationStore` is the query contract the fetch layer consumes.
//! `PgObservationStore` talks to the PostgreSQL `point` schema;
//! `MemoryStore` serves rows held in memory for tests and offline use.

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::model::{ObservationRequest, ObservationRow};
use crate::query::StoreQuery;

pub use self::memory::MemoryStore;
pub use self::postgres::PgObservationStore;

/// Something that can answer an observation query.
///
/// Implementations return rows for `request.variable` only, excluding null
/// values, in source units, sorted by (station object id, timestamp).
/// `query` is the SQL form of `request` for stores that speak SQL.
pub trait ObservationStore {
    fn fetch_rows(
        &mut self,
        request: &ObservationRequest,
        query: &StoreQuery,
    ) -> Result<Vec<ObservationRow>, StoreError>;
}
