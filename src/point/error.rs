//! Error types for point construction.

/// Indicates that a point component was outside its valid range or not a finite number.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InvalidPoint {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("timestamp {0} is not a finite number of seconds")]
    Timestamp(f64),
}
