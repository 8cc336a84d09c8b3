use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::{LocationRepository, StorageError, TRACKED_LOCATIONS_KEY, decode_history, encode_history};
use crate::point::TrackedPoint;

/// A [`LocationRepository`] keeping its key-value document in memory.
///
/// Holds the same representation as [`FileLocationRepository`](super::FileLocationRepository),
/// which makes it possible to seed arbitrary (including malformed) stored values.
#[derive(Debug)]
pub struct MemoryLocationRepository {
    document: Mutex<Map<String, Value>>,
}

impl MemoryLocationRepository {
    pub fn new() -> Self {
        Self {
            document: Mutex::new(Map::new()),
        }
    }

    /// Create a repository whose tracked locations key already holds `raw`.
    pub fn with_raw(raw: Value) -> Self {
        let mut document = Map::new();
        document.insert(TRACKED_LOCATIONS_KEY.to_string(), raw);
        Self {
            document: Mutex::new(document),
        }
    }

    /// The raw stored value of the tracked locations key.
    pub fn raw(&self) -> Option<Value> {
        self.lock()
            .ok()
            .and_then(|document| document.get(TRACKED_LOCATIONS_KEY).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Map<String, Value>>, StorageError> {
        self.document
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryLocationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationRepository for MemoryLocationRepository {
    fn save(&self, history: &[TrackedPoint]) -> Result<(), StorageError> {
        let encoded = encode_history(history)?;
        self.lock()?.insert(TRACKED_LOCATIONS_KEY.to_string(), encoded);
        Ok(())
    }

    fn load(&self) -> Result<Vec<TrackedPoint>, StorageError> {
        let document = self.lock()?;
        Ok(decode_history(document.get(TRACKED_LOCATIONS_KEY)))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.remove(TRACKED_LOCATIONS_KEY);
        Ok(())
    }
}
