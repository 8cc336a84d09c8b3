//! Distance filtering between consecutive tracked points.

use geo::{Distance, Haversine, Point};

use crate::point::TrackedPoint;

/// Minimum great-circle distance between two recorded points, in meters.
pub const DEFAULT_DISTANCE_THRESHOLD_M: f64 = 1.0;

/// Great-circle distance between two points in meters.
pub fn distance_meters(a: &TrackedPoint, b: &TrackedPoint) -> f64 {
    let from = Point::new(a.longitude(), a.latitude());
    let to = Point::new(b.longitude(), b.latitude());
    Haversine::distance(from, to)
}

/// Decide whether `candidate` is far enough from the last recorded point to be recorded.
///
/// With no `reference` the candidate is always recorded. Otherwise it is recorded when its
/// distance from `reference` is at least `threshold_meters` (a candidate exactly on the
/// threshold is recorded).
pub fn should_record(
    candidate: &TrackedPoint,
    reference: Option<&TrackedPoint>,
    threshold_meters: f64,
) -> bool {
    match reference {
        None => true,
        Some(reference) => distance_meters(candidate, reference) >= threshold_meters,
    }
}
