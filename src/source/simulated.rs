use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use rand::Rng;
use tracing::{debug, warn};

use super::{AuthorizationStatus, DeliveryMode, PositionSource, SourceCommand, SourceSink};
use crate::point::{Coordinate, Timestamp, TrackedPoint};
use crate::state_machine::wrappers::input::SystemResource;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A [`PositionSource`] that moves a virtual device around on demand.
///
/// Every command it receives is recorded and can be inspected with
/// [`commands`](SimulatedSource::commands). A permission request is answered with the configured
/// authorization status. Samples produced by [`simulate_movement`](SimulatedSource::simulate_movement)
/// are only delivered while updates are started.
pub struct SimulatedSource {
    state: Mutex<SimulatedState>,
}

struct SimulatedState {
    sink: Option<SourceSink>,
    position: Coordinate,
    permission_response: AuthorizationStatus,
    delivery: Option<DeliveryMode>,
    commands: Vec<SourceCommand>,
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource")
            .field("state", &"<SimulatedState>")
            .finish()
    }
}

impl SimulatedSource {
    /// Create a source parked at `start` that grants permission when asked.
    pub fn new(start: Coordinate) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                sink: None,
                position: start,
                permission_response: AuthorizationStatus::Granted,
                delivery: None,
                commands: Vec::new(),
            }),
        }
    }

    /// Answer permission requests with `status` instead of granting them.
    pub fn with_permission_response(self, status: AuthorizationStatus) -> Self {
        self.lock().permission_response = status;
        self
    }

    /// Connect the source to the engine that should receive its events.
    pub fn attach(&self, sink: SourceSink) {
        self.lock().sink = Some(sink);
    }

    /// All commands received so far, oldest first.
    pub fn commands(&self) -> Vec<SourceCommand> {
        self.lock().commands.clone()
    }

    /// The current delivery mode, or `None` when updates are stopped.
    pub fn delivery(&self) -> Option<DeliveryMode> {
        self.lock().delivery
    }

    pub fn position(&self) -> Coordinate {
        self.lock().position
    }

    /// Move the device `meters` along `bearing_degrees` (clockwise from north) and deliver the
    /// new position when updates are running.
    ///
    /// Returns the sample for the new position whether or not it was delivered.
    pub fn simulate_movement(&self, meters: f64, bearing_degrees: f64) -> TrackedPoint {
        let mut state = self.lock();
        let destination = destination(state.position, meters, bearing_degrees);
        state.position = destination;

        let sample = TrackedPoint::at(destination, Timestamp::generate());
        if state.delivery.is_some() {
            state.deliver_sample(sample);
        }

        sample
    }

    /// A stream that moves the device `meters` in a random north-easterly direction every
    /// `interval`, `steps` times, yielding each produced sample.
    pub fn random_walk(
        self: Arc<Self>,
        meters: f64,
        steps: usize,
        interval: Duration,
    ) -> impl Stream<Item = TrackedPoint> {
        stream! {
            let mut ticker = tokio::time::interval(interval);
            for _ in 0..steps {
                ticker.tick().await;
                let bearing: f64 = rand::rng().random_range(1.0..=90.0);
                yield self.simulate_movement(meters, bearing);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().expect("simulated source lock poisoned")
    }
}

impl SimulatedState {
    fn deliver_sample(&self, sample: TrackedPoint) {
        match &self.sink {
            Some(sink) => {
                if sink.sample(sample).is_err() {
                    warn!("Engine gone, dropping simulated sample");
                }
            }
            None => debug!("No sink attached, dropping simulated sample"),
        }
    }
}

impl PositionSource for SimulatedSource {
    fn request_permission(&self) {
        let mut state = self.lock();
        state.commands.push(SourceCommand::RequestPermission);

        let status = state.permission_response;
        if let Some(sink) = &state.sink {
            let _ = sink.authorization_changed(status);
        }
    }

    fn start_updates(&self, mode: DeliveryMode) {
        let mut state = self.lock();
        state.commands.push(SourceCommand::StartUpdates(mode));
        state.delivery = Some(mode);
        debug!(mode = ?mode, "Simulated updates started");
    }

    fn stop_updates(&self) {
        let mut state = self.lock();
        state.commands.push(SourceCommand::StopUpdates);
        state.delivery = None;
        debug!("Simulated updates stopped");
    }
}

/// The point reached by travelling `meters` from `origin` along `bearing_degrees` on a sphere.
fn destination(origin: Coordinate, meters: f64, bearing_degrees: f64) -> Coordinate {
    let angular = meters / EARTH_RADIUS_M;
    let bearing = bearing_degrees.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lon1 = origin.longitude().to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    let latitude = lat2.to_degrees().clamp(-90.0, 90.0);
    let longitude = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

    // Both components are in range by construction; fall back to the origin on NaN input.
    Coordinate::new(latitude, longitude).unwrap_or(origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::distance_meters;
    use crate::source::SourceEvent;
    use crate::source::testing::detached_sink;

    fn origin() -> Coordinate {
        Coordinate::new(41.0082, 28.9784).unwrap()
    }

    #[test]
    fn test_destination_distance() {
        let start = TrackedPoint::at(origin(), Timestamp::from_epoch_seconds(0.0).unwrap());
        let moved = TrackedPoint::at(
            destination(origin(), 100.0, 45.0),
            Timestamp::from_epoch_seconds(0.0).unwrap(),
        );

        let travelled = distance_meters(&start, &moved);
        assert!((travelled - 100.0).abs() < 0.1, "travelled {travelled}m");
    }

    #[test]
    fn test_destination_due_north() {
        let moved = destination(origin(), 1_000.0, 0.0);
        assert!(moved.latitude() > origin().latitude());
        assert!((moved.longitude() - origin().longitude()).abs() < 1e-9);
    }

    #[test]
    fn test_destination_wraps_antimeridian() {
        let start = Coordinate::new(0.0, 179.9999).unwrap();
        let moved = destination(start, 1_000.0, 90.0);
        assert!(moved.longitude() < 0.0);
        assert!(moved.longitude() >= -180.0);
    }

    #[test]
    fn test_commands_recorded() {
        let source = SimulatedSource::new(origin());
        source.request_permission();
        source.start_updates(DeliveryMode::Continuous);
        source.stop_updates();

        assert_eq!(
            source.commands(),
            vec![
                SourceCommand::RequestPermission,
                SourceCommand::StartUpdates(DeliveryMode::Continuous),
                SourceCommand::StopUpdates,
            ]
        );
        assert_eq!(source.delivery(), None);
    }

    #[test]
    fn test_samples_only_delivered_while_updating() {
        let (sink, mut inbox) = detached_sink();
        let source = SimulatedSource::new(origin());
        source.attach(sink);

        source.simulate_movement(10.0, 90.0);
        assert!(inbox.try_next().is_none());

        source.start_updates(DeliveryMode::Passive);
        let sample = source.simulate_movement(10.0, 90.0);
        assert_eq!(inbox.try_next(), Some(SourceEvent::Sample(sample)));
        assert_eq!(source.position(), sample.coordinate());
    }

    #[test]
    fn test_permission_response() {
        let (sink, mut inbox) = detached_sink();
        let source =
            SimulatedSource::new(origin()).with_permission_response(AuthorizationStatus::Denied);
        source.attach(sink);

        source.request_permission();
        assert_eq!(
            inbox.try_next(),
            Some(SourceEvent::Authorization(AuthorizationStatus::Denied))
        );
    }

    #[tokio::test]
    async fn test_random_walk_moves() {
        use futures::StreamExt;

        let source = Arc::new(SimulatedSource::new(origin()));
        let samples: Vec<TrackedPoint> = Arc::clone(&source)
            .random_walk(100.0, 3, Duration::from_millis(1))
            .collect()
            .await;

        assert_eq!(samples.len(), 3);
        // every bearing points east of north
        for pair in samples.windows(2) {
            assert!(pair[1].longitude() > pair[0].longitude());
        }
        assert!(samples[0].longitude() > origin().longitude());
    }
}
