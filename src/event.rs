use crate::error::TrackingError;
use crate::point::TrackedPoint;
use crate::source::AuthorizationStatus;

/// A state change published by the tracking engine to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// A raw sample arrived, whether or not it was recorded.
    PositionUpdated(TrackedPoint),
    /// A sample passed the distance filter and was appended to history.
    TrackedPointAdded(TrackedPoint),
    HistoryCleared,
    TrackingToggled(bool),
    AuthorizationChanged(AuthorizationStatus),
    ErrorRaised(TrackingError),
}
