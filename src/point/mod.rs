pub mod error;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use self::error::InvalidPoint;

/// A wall-clock instant expressed as seconds since the Unix epoch.
///
/// Stored as an `f64` so that a point survives a round trip through persistence unchanged.
/// Always finite, so timestamps are totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Create a [`Timestamp`] from fractional seconds since the Unix epoch.
    ///
    /// NaN and infinite values are rejected.
    pub fn from_epoch_seconds(seconds: f64) -> Result<Self, InvalidPoint> {
        if !seconds.is_finite() {
            return Err(InvalidPoint::Timestamp(seconds));
        }

        Ok(Self(seconds))
    }

    /// Read the current system clock.
    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        Self(seconds)
    }

    pub fn as_epoch_seconds(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Validate and construct a [`Coordinate`].
    ///
    /// Latitude must lie in `[-90, 90]` and longitude in `[-180, 180]`. Non-finite values are
    /// rejected.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidPoint> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidPoint::Latitude(latitude));
        }

        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidPoint::Longitude(longitude));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A position reading: a [`Coordinate`] and the instant it was taken.
///
/// Points are immutable once constructed. The same type is used for raw samples coming from a
/// position source and for points recorded into tracking history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    coordinate: Coordinate,
    timestamp: Timestamp,
}

impl TrackedPoint {
    /// Validate the coordinate and construct a [`TrackedPoint`].
    pub fn new(latitude: f64, longitude: f64, timestamp: Timestamp) -> Result<Self, InvalidPoint> {
        Ok(Self::at(Coordinate::new(latitude, longitude)?, timestamp))
    }

    /// Construct a [`TrackedPoint`] from an already validated [`Coordinate`] and [`Timestamp`].
    pub fn at(coordinate: Coordinate, timestamp: Timestamp) -> Self {
        Self {
            coordinate,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn latitude(&self) -> f64 {
        self.coordinate.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinate.longitude
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl fmt::Display for TrackedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) @ {}", self.coordinate, self.timestamp)
    }
}
