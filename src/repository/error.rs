//! Error types for tracked location persistence.

/// A failure to read or write the backing store of a
/// [`LocationRepository`](super::LocationRepository).
///
/// Malformed stored data is not an error; it is recovered from by skipping what cannot be
/// parsed. Only genuine IO or encoding failures are reported.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing store failed.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store could not be serialized.
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),

    /// The freshly written store could not replace the previous one.
    #[error("failed to replace store: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The store is not usable at all (e.g. a poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
