//! Error types for talking to a running tracking engine.

/// Indicates that a command could not be processed because the engine has shut down.
#[derive(Debug, thiserror::Error)]
#[error("tracking engine has shut down")]
pub struct EngineClosed;
