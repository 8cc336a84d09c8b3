use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identifies one tracking session, i.e. the lifetime of one engine instance.
///
/// Attached to the engine's tracing span so log lines of concurrent engines can be told apart.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct SessionId(Arc<Uuid>);

impl SessionId {
    pub fn generate() -> Self {
        Self(Arc::new(Uuid::new_v4()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
