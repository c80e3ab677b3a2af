/// On-disk cache of historical query results.
///
/// Observations older than the staleness threshold are assumed final
/// upstream, so a result for a window that closed more than 60 days ago is
/// written once and served from disk on every later identical request.
/// Entries are never updated or invalidated.
///
/// # Clock injection
/// `is_cacheable_at` and `CacheGate::store_at` take `now` rather than
/// calling `Utc::now()`, so the staleness rule is deterministic in tests.
///
/// # Keys
/// Requests carrying a bounding box have no key at all: they are never read
/// from or written to the cache.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;
use crate::logging::{self, DataSource};
use crate::matrix::ObservationMatrix;
use crate::model::{ObservationRequest, ObservationRow, STALENESS_THRESHOLD_DAYS, TimeSpec};
use crate::pivot;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Something that can live in the cache.
pub trait CachePayload: Serialize + DeserializeOwned {
    /// Appended to the key so different payloads for one request never
    /// share a file.
    const KEY_SUFFIX: &'static str;

    /// Structural check run on every entry read back from disk.
    fn check(&self) -> Result<(), String>;

    /// Confirms an entry found under `request`'s key was written for that
    /// request. Keys are hour-resolution, so sub-hour bounds can collide.
    fn matches(&self, request: &ObservationRequest) -> Result<(), String>;
}

impl CachePayload for ObservationMatrix {
    const KEY_SUFFIX: &'static str = "";

    fn check(&self) -> Result<(), String> {
        self.validate()
    }

    fn matches(&self, request: &ObservationRequest) -> Result<(), String> {
        if self.variable != request.variable {
            return Err(format!(
                "entry holds {} but {} was requested",
                self.variable, request.variable
            ));
        }
        let expected = pivot::time_axis_for(&request.time_spec);
        if self.time_axis != expected {
            return Err(format!(
                "entry axis {:?} does not match requested axis {:?}",
                self.time_axis, expected
            ));
        }
        Ok(())
    }
}

impl CachePayload for Vec<ObservationRow> {
    const KEY_SUFFIX: &'static str = "_rows";

    fn check(&self) -> Result<(), String> {
        Ok(())
    }

    fn matches(&self, request: &ObservationRequest) -> Result<(), String> {
        let Some((begin, end)) = request.time_spec.hourly_bounds() else {
            return Ok(());
        };
        match self.iter().find(|r| r.timestamp < begin || r.timestamp > end) {
            Some(row) => Err(format!(
                "row at {} lies outside requested window {} to {}",
                row.timestamp, begin, end
            )),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Staleness policy
// ---------------------------------------------------------------------------

/// Returns `true` if a result for `request` may be written to the cache at
/// `now`: no bounding box, and the window ended strictly more than
/// `STALENESS_THRESHOLD_DAYS` before `now`.
pub fn is_cacheable_at(request: &ObservationRequest, now: DateTime<Utc>) -> bool {
    request.bounding_box.is_none()
        && now - request.time_spec.window_end() > Duration::days(STALENESS_THRESHOLD_DAYS)
}

// ---------------------------------------------------------------------------
// Key construction
// ---------------------------------------------------------------------------

fn stamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d%H").to_string()
}

/// Deterministic file name for a request, or `None` if the request is
/// never cached.
pub fn cache_file_name(request: &ObservationRequest, suffix: &str) -> Option<String> {
    if request.bounding_box.is_some() {
        return None;
    }
    let label = request.variable.descriptor().label;
    let window = match request.time_spec {
        TimeSpec::Range { begin, end } => format!("{}_to_{}", stamp(begin), stamp(end)),
        TimeSpec::Prior { target, hours } => {
            format!("{}_hours_prior_to_{}", hours, stamp(target))
        }
        TimeSpec::Instant { target, duration_hours } => {
            format!("{}_hours_ending_{}", duration_hours, stamp(target))
        }
    };
    let filter = request
        .co_occurrence
        .map(|v| format!("_{}", v.descriptor().label))
        .unwrap_or_default();
    Some(format!("obs_{}_{}{}{}.json", label, window, filter, suffix))
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Cache access for one call. A gate without a directory never hits and
/// never writes.
#[derive(Debug, Clone, Default)]
pub struct CacheGate {
    dir: Option<PathBuf>,
}

impl CacheGate {
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            dir: dir.map(Path::to_path_buf),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Full path of the entry for `request`, if it has one.
    pub fn entry_path<T: CachePayload>(&self, request: &ObservationRequest) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        cache_file_name(request, T::KEY_SUFFIX).map(|name| dir.join(name))
    }

    /// Returns the cached payload for `request`, or `None` on a miss.
    ///
    /// A corrupt or unreadable entry, or one written for a different
    /// variable or time axis, is logged and reported as a miss so the caller
    /// goes back to the store.
    pub fn load<T: CachePayload>(&self, request: &ObservationRequest) -> Option<T> {
        let path = self.entry_path::<T>(request)?;
        if !path.is_file() {
            return None;
        }
        let loaded = read_entry::<T>(&path).and_then(|payload| {
            payload
                .matches(request)
                .map(|()| payload)
                .map_err(|reason| CacheError::Corrupt {
                    path: path.display().to_string(),
                    reason,
                })
        });
        match loaded {
            Ok(payload) => {
                logging::debug(DataSource::Cache, &format!("hit {}", path.display()));
                Some(payload)
            }
            Err(e) => {
                logging::warn(DataSource::Cache, &format!("ignoring cache entry: {}", e));
                None
            }
        }
    }

    /// Writes `payload` if the request is cacheable at `now`. Returns
    /// whether a new entry was created. An existing entry is left alone.
    pub fn store_at<T: CachePayload>(
        &self,
        request: &ObservationRequest,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        if !is_cacheable_at(request, now) {
            return Ok(false);
        }
        let Some(path) = self.entry_path::<T>(request) else {
            return Ok(false);
        };
        if path.exists() {
            return Ok(false);
        }
        write_entry(&path, payload)
    }
}

fn read_entry<T: CachePayload>(path: &Path) -> Result<T, CacheError> {
    let bytes = fs::read(path).map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let payload: T = serde_json::from_slice(&bytes).map_err(|source| CacheError::Serialize {
        path: path.display().to_string(),
        source,
    })?;
    payload.check().map_err(|reason| CacheError::Corrupt {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(payload)
}

/// Writes through a temp file in the target directory, then renames it into
/// place without clobbering. A reader never sees a partial entry.
fn write_entry<T: CachePayload>(path: &Path, payload: &T) -> Result<bool, CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.display().to_string(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let encoded = serde_json::to_vec(payload).map_err(|source| CacheError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&encoded).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        // Another writer got there first; entries are immutable, so theirs stands.
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(io_err(e.error)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
