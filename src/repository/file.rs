use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{LocationRepository, StorageError, TRACKED_LOCATIONS_KEY, decode_history, encode_history};
use crate::point::TrackedPoint;

/// A [`LocationRepository`] backed by a JSON key-value document on disk.
///
/// Every write produces a complete new document in a temporary file next to the target and
/// renames it into place, so a reader sees either the previous document or the new one. Keys
/// other than the tracked locations key are carried over untouched.
#[derive(Debug, Clone)]
pub struct FileLocationRepository {
    path: PathBuf,
    key: String,
}

impl FileLocationRepository {
    /// Create a repository storing history at `path` under [`TRACKED_LOCATIONS_KEY`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: TRACKED_LOCATIONS_KEY.to_string(),
        }
    }

    /// Use `key` instead of [`TRACKED_LOCATIONS_KEY`] inside the document.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => {
                warn!(path = %self.path.display(), "Store is not a key-value document, treating as empty");
                Ok(Map::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Store is unreadable, treating as empty");
                Ok(Map::new())
            }
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut staged = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut staged, document)?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path)?;

        Ok(())
    }
}

impl LocationRepository for FileLocationRepository {
    fn save(&self, history: &[TrackedPoint]) -> Result<(), StorageError> {
        let mut document = self.read_document()?;
        document.insert(self.key.clone(), encode_history(history)?);
        self.write_document(&document)?;

        debug!(path = %self.path.display(), count = history.len(), "Saved tracked locations");
        Ok(())
    }

    fn load(&self) -> Result<Vec<TrackedPoint>, StorageError> {
        let document = self.read_document()?;
        Ok(decode_history(document.get(&self.key)))
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut document = self.read_document()?;
        if document.remove(&self.key).is_some() {
            self.write_document(&document)?;
            debug!(path = %self.path.display(), "Cleared tracked locations");
        }

        Ok(())
    }
}
