//! Error types surfaced to observers of the tracking engine.

/// A failure reported by the tracking engine through an `ErrorRaised` event.
///
/// None of these are fatal. The engine keeps running in a safe default state and observers
/// decide how to present the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackingError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location access is restricted on this device")]
    PermissionRestricted,

    #[error("unable to determine current location")]
    LocationUnavailable,

    #[error("failed to save location data")]
    SaveFailed,

    #[error("failed to load saved location data")]
    LoadFailed,

    #[error("location error: {0}")]
    Unknown(String),

    #[error("geocoding failed: {0}")]
    GeocodeFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// The discriminant of a [`TrackingError`] without its detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionDenied,
    PermissionRestricted,
    LocationUnavailable,
    SaveFailed,
    LoadFailed,
    Unknown,
    GeocodeFailed,
    Storage,
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::PermissionDenied => ErrorKind::PermissionDenied,
            TrackingError::PermissionRestricted => ErrorKind::PermissionRestricted,
            TrackingError::LocationUnavailable => ErrorKind::LocationUnavailable,
            TrackingError::SaveFailed => ErrorKind::SaveFailed,
            TrackingError::LoadFailed => ErrorKind::LoadFailed,
            TrackingError::Unknown(_) => ErrorKind::Unknown,
            TrackingError::GeocodeFailed(_) => ErrorKind::GeocodeFailed,
            TrackingError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The free-form detail carried by the error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            TrackingError::Unknown(detail)
            | TrackingError::GeocodeFailed(detail)
            | TrackingError::Storage(detail) => Some(detail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_detail() {
        let err = TrackingError::Storage("disk full".to_string());
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.detail(), Some("disk full"));

        assert_eq!(TrackingError::SaveFailed.kind(), ErrorKind::SaveFailed);
        assert_eq!(TrackingError::SaveFailed.detail(), None);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = TrackingError::Unknown("Unknown authorization status".to_string());
        assert_eq!(
            err.to_string(),
            "location error: Unknown authorization status"
        );
    }
}
