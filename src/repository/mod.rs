//! Durable persistence of tracking history.
//!
//! History is stored in a key-value document under a single key (by default
//! [`TRACKED_LOCATIONS_KEY`]) as an ordered array of records:
//!
//! ```json
//! { "trackedLocations": [ { "latitude": 41.0, "longitude": 29.0, "timestamp": 1716370000.5 } ] }
//! ```
//!
//! Loading is best-effort. A missing key, a value of the wrong type or an unreadable document
//! all load as empty history, and individual records that fail to parse are skipped while the
//! remaining records keep their relative order.

pub mod error;
pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::point::{Timestamp, TrackedPoint};

pub use self::error::StorageError;
pub use self::file::FileLocationRepository;
pub use self::memory::MemoryLocationRepository;

/// Storage key holding the tracked location records.
pub const TRACKED_LOCATIONS_KEY: &str = "trackedLocations";

/// Persistence of an ordered sequence of [`TrackedPoint`]s.
///
/// Implementations are synchronous. The tracking engine calls them from a blocking worker so
/// the event loop never waits on storage.
pub trait LocationRepository: Send + Sync {
    /// Replace the entire persisted history with `history`.
    ///
    /// The replacement must be atomic from the point of view of a concurrent [`load`].
    ///
    /// [`load`]: LocationRepository::load
    fn save(&self, history: &[TrackedPoint]) -> Result<(), StorageError>;

    /// Load the persisted history, skipping malformed records.
    fn load(&self) -> Result<Vec<TrackedPoint>, StorageError>;

    /// Remove all persisted history.
    fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPoint {
    latitude: f64,
    longitude: f64,
    timestamp: f64,
}

impl From<&TrackedPoint> for StoredPoint {
    fn from(point: &TrackedPoint) -> Self {
        Self {
            latitude: point.latitude(),
            longitude: point.longitude(),
            timestamp: point.timestamp().as_epoch_seconds(),
        }
    }
}

impl StoredPoint {
    fn into_point(self) -> Option<TrackedPoint> {
        let timestamp = Timestamp::from_epoch_seconds(self.timestamp).ok()?;
        TrackedPoint::new(self.latitude, self.longitude, timestamp).ok()
    }
}

/// Encode `history` into its stored representation.
pub(crate) fn encode_history(history: &[TrackedPoint]) -> Result<Value, StorageError> {
    let records: Vec<StoredPoint> = history.iter().map(StoredPoint::from).collect();
    Ok(serde_json::to_value(records)?)
}

/// Decode the stored representation, dropping anything that does not parse.
pub(crate) fn decode_history(value: Option<&Value>) -> Vec<TrackedPoint> {
    let Some(value) = value else {
        return Vec::new();
    };

    let Some(entries) = value.as_array() else {
        warn!("Stored tracked locations are not an array, ignoring");
        return Vec::new();
    };

    let history: Vec<TrackedPoint> = entries
        .iter()
        .filter_map(|entry| StoredPoint::deserialize(entry).ok())
        .filter_map(StoredPoint::into_point)
        .collect();

    let skipped = entries.len() - history.len();
    if skipped > 0 {
        warn!(skipped, kept = history.len(), "Skipped malformed tracked locations");
    }

    history
}
