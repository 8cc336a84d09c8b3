use crate::error::TrackingError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    #[error("{0}")]
    Failed(String),

    #[error("a lookup for this coordinate is already in flight")]
    InFlight,
}

impl From<GeocodeError> for TrackingError {
    fn from(e: GeocodeError) -> Self {
        TrackingError::GeocodeFailed(e.to_string())
    }
}
