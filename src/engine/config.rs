use bon::Builder;
use tracing::warn;

use crate::distance::DEFAULT_DISTANCE_THRESHOLD_M;

/// Configuration for the tracking engine.
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    /// Minimum distance in meters between consecutive recorded points.
    #[builder(default = DEFAULT_DISTANCE_THRESHOLD_M)]
    pub threshold_meters: f64,

    /// Number of events buffered per observer before a slow observer starts missing events.
    #[builder(default = 64)]
    pub event_capacity: usize,
}

impl EngineConfig {
    /// The configured threshold, or [`DEFAULT_DISTANCE_THRESHOLD_M`] when it is negative or not
    /// a finite number.
    pub fn threshold_or_default(&self) -> f64 {
        if self.threshold_meters.is_finite() && self.threshold_meters >= 0.0 {
            return self.threshold_meters;
        }

        warn!(
            configured = self.threshold_meters,
            fallback = DEFAULT_DISTANCE_THRESHOLD_M,
            "Invalid distance threshold, using default"
        );
        DEFAULT_DISTANCE_THRESHOLD_M
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
