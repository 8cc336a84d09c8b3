//! Error types for handing source events to the engine.

/// Indicates that an event could not be delivered because the receiving engine has shut down.
#[derive(Debug, thiserror::Error)]
#[error("tracking engine is no longer receiving source events")]
pub struct SinkClosed;
