//! The runtime around [`TrackingMachine`].
//!
//! A [`TrackingEngine`] owns one tracking machine on a dedicated tokio task. Commands from
//! observers and events from the position source arrive in a single inbox and are applied to
//! the machine strictly one at a time, in arrival order. The machine's output is then carried
//! out on the same task:
//!
//! - events are broadcast to every [`Subscription`];
//! - source commands are forwarded to the [`PositionSource`];
//! - storage requests are queued to a persistence worker that runs them on the blocking pool.
//!
//! The machine never waits on storage. History is updated in memory first, and a storage
//! failure comes back later as input that turns into an `ErrorRaised` event.
//!
//! ```ignore
//! let repository = Arc::new(FileLocationRepository::new("tracked.json"));
//! let source = Arc::new(SimulatedSource::new(start));
//!
//! let (engine, mut events) = TrackingEngine::start(EngineConfig::default(), repository, source.clone()).await;
//! source.attach(engine.source_sink());
//!
//! engine.request_permission().await?;
//! engine.start_tracking().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod config;
pub mod error;
mod persistence;
pub mod subscription;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::event::TrackingEvent;
use crate::point::TrackedPoint;
use crate::repository::LocationRepository;
use crate::session::SessionId;
use crate::source::{PositionSource, SourceEvent, SourceSink};
use crate::state_machine::StateMachine;
use crate::state_machine::tracking::{
    StorageFailure, TrackingCommand, TrackingInput, TrackingMachine, TrackingOutput,
};

use self::error::EngineClosed;
use self::persistence::StorageOp;

pub use self::config::EngineConfig;
pub use self::subscription::Subscription;

/// Everything the engine task can receive through its inbox.
pub(crate) enum EngineMessage {
    Source(SourceEvent),
    Command(TrackingCommand, oneshot::Sender<()>),
    History(oneshot::Sender<Vec<TrackedPoint>>),
    CurrentPosition(oneshot::Sender<Option<TrackedPoint>>),
    IsTracking(oneshot::Sender<bool>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to a running tracking engine.
///
/// Command methods resolve once the command has been applied and the resulting events have
/// been published. Dropping the handle stops the engine without waiting for it; use
/// [`shutdown`](TrackingEngine::shutdown) to wait until pending storage work has finished.
pub struct TrackingEngine {
    session_id: SessionId,
    inbox: mpsc::UnboundedSender<EngineMessage>,
    events: broadcast::Sender<TrackingEvent>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TrackingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingEngine")
            .field("session_id", &self.session_id)
            .field("observers", &self.events.receiver_count())
            .finish()
    }
}

impl TrackingEngine {
    /// Restore persisted history from `repository` and start the engine.
    ///
    /// Restoring is silent. If loading fails the engine starts with empty history and the
    /// returned subscription, which exists before anything is published, receives a
    /// `LoadFailed` error as its first event. Must be called within a tokio runtime.
    pub async fn start(
        config: EngineConfig,
        repository: Arc<dyn LocationRepository>,
        source: Arc<dyn PositionSource>,
    ) -> (TrackingEngine, Subscription) {
        let session_id = SessionId::generate();
        let (events, first_subscription) = broadcast::channel(config.event_capacity.max(1));
        let threshold_meters = config.threshold_or_default();

        let machine = match persistence::load(&repository).await {
            Ok(history) => {
                info!(session_id = %session_id, count = history.len(), "Restored tracked locations");
                TrackingMachine::restore(threshold_meters, history)
            }
            Err(detail) => {
                warn!(session_id = %session_id, error = %detail, "Failed to restore tracked locations");
                let mut machine = TrackingMachine::new(threshold_meters);
                machine.process_input(TrackingInput::StorageFailed(StorageFailure::Load(detail)));
                machine
            }
        };
        // Pending output is only published once the loop runs, after the first subscription
        // already exists.
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (storage, worker) = persistence::spawn_worker(repository, failures_tx);
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        let engine_loop = EngineLoop {
            machine,
            source,
            events: events.clone(),
            storage,
            inbox: inbox_rx,
            storage_failures: failures_rx,
        };

        let span = info_span!("tracking_engine", session_id = %session_id);
        let task = tokio::spawn(engine_loop.run(worker).instrument(span));

        let engine = TrackingEngine {
            session_id,
            inbox,
            events,
            task: Some(task),
        };

        (engine, Subscription::new(first_subscription))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// A sink for the position source to report through.
    pub fn source_sink(&self) -> SourceSink {
        SourceSink::new(self.inbox.clone())
    }

    /// Subscribe a new observer to every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    pub async fn request_permission(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::RequestPermission).await
    }

    /// Start recording history. Does nothing when already tracking.
    pub async fn start_tracking(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::StartTracking).await
    }

    /// Stop recording history. The current position keeps updating.
    pub async fn stop_tracking(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::StopTracking).await
    }

    /// Clear history in memory and in storage.
    ///
    /// There is no confirmation step here; observers ask the user before calling this.
    pub async fn reset(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::Reset).await
    }

    pub async fn start_updates(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::StartUpdates).await
    }

    /// Stop raw delivery from the position source altogether.
    pub async fn stop_updates(&self) -> Result<(), EngineClosed> {
        self.command(TrackingCommand::StopUpdates).await
    }

    /// The recorded history, oldest first.
    pub async fn history(&self) -> Result<Vec<TrackedPoint>, EngineClosed> {
        self.request(EngineMessage::History).await
    }

    /// The latest raw sample, recorded or not.
    pub async fn current_position(&self) -> Result<Option<TrackedPoint>, EngineClosed> {
        self.request(EngineMessage::CurrentPosition).await
    }

    pub async fn is_tracking(&self) -> Result<bool, EngineClosed> {
        self.request(EngineMessage::IsTracking).await
    }

    /// Wait until every storage operation caused by earlier input has finished.
    pub async fn flush(&self) -> Result<(), EngineClosed> {
        self.request(EngineMessage::Flush).await
    }

    /// Stop the engine, wait for queued storage operations and join its tasks.
    pub async fn shutdown(mut self) {
        let _ = self.inbox.send(EngineMessage::Shutdown);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(session_id = %self.session_id, error = %e, "Tracking engine task failed");
            }
        }
    }

    async fn command(&self, command: TrackingCommand) -> Result<(), EngineClosed> {
        self.request(|reply| EngineMessage::Command(command, reply))
            .await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> EngineMessage,
    ) -> Result<T, EngineClosed> {
        let (reply, response) = oneshot::channel();
        self.inbox.send(message(reply)).map_err(|_| EngineClosed)?;
        response.await.map_err(|_| EngineClosed)
    }
}

impl Drop for TrackingEngine {
    fn drop(&mut self) {
        let _ = self.inbox.send(EngineMessage::Shutdown);
    }
}

struct EngineLoop {
    machine: TrackingMachine,
    source: Arc<dyn PositionSource>,
    events: broadcast::Sender<TrackingEvent>,
    storage: mpsc::UnboundedSender<StorageOp>,
    inbox: mpsc::UnboundedReceiver<EngineMessage>,
    storage_failures: mpsc::UnboundedReceiver<StorageFailure>,
}

impl EngineLoop {
    async fn run(mut self, worker: JoinHandle<()>) {
        info!(
            history = self.machine.history().len(),
            threshold_meters = self.machine.threshold_meters(),
            "Tracking engine started"
        );
        self.dispatch_pending();

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(EngineMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message),
                },

                Some(failure) = self.storage_failures.recv() => {
                    self.process(TrackingInput::StorageFailed(failure));
                }
            }
        }

        // Closing the queue lets the worker finish what is already queued and exit.
        drop(self.storage);
        if let Err(e) = worker.await {
            error!(error = %e, "Persistence worker failed");
        }

        info!("Tracking engine stopped");
    }

    fn handle(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Source(event) => self.process(TrackingInput::from(event)),

            EngineMessage::Command(command, reply) => {
                debug!(command = ?command, "Processing command");
                self.process(TrackingInput::Command(command));
                let _ = reply.send(());
            }

            EngineMessage::History(reply) => {
                let _ = reply.send(self.machine.history().to_vec());
            }

            EngineMessage::CurrentPosition(reply) => {
                let _ = reply.send(self.machine.current_position().copied());
            }

            EngineMessage::IsTracking(reply) => {
                let _ = reply.send(self.machine.is_tracking());
            }

            EngineMessage::Flush(reply) => {
                if self.storage.send(StorageOp::Flush(reply)).is_err() {
                    error!("Persistence worker gone, cannot flush");
                }
            }

            EngineMessage::Shutdown => {}
        }
    }

    fn process(&mut self, input: TrackingInput) {
        self.machine.process_input(input);
        self.dispatch_pending();
    }

    fn dispatch_pending(&mut self) {
        while let Some(output) = self.machine.poll_output() {
            match output {
                TrackingOutput::Event(event) => self.publish(event),

                TrackingOutput::Source(command) => {
                    debug!(command = ?command, "Commanding position source");
                    self.source.execute(command);
                }

                TrackingOutput::Storage(request) => {
                    if self.storage.send(StorageOp::from(request)).is_err() {
                        error!("Persistence worker gone, dropping storage request");
                    }
                }
            }
        }
    }

    fn publish(&self, event: TrackingEvent) {
        match &event {
            TrackingEvent::TrackedPointAdded(point) => {
                debug!(point = %point, history = self.machine.history().len(), "Recorded point");
            }
            TrackingEvent::ErrorRaised(e) => warn!(error = %e, kind = ?e.kind(), "Tracking error"),
            _ => {}
        }

        // No observers is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackingError;
    use crate::point::{Coordinate, Timestamp};
    use crate::repository::{FileLocationRepository, MemoryLocationRepository, StorageError};
    use crate::source::{AuthorizationStatus, DeliveryMode, SimulatedSource, SourceCommand};
    use futures::StreamExt;
    use serde_json::json;

    fn point(lat: f64, lon: f64, ts: f64) -> TrackedPoint {
        TrackedPoint::new(lat, lon, Timestamp::from_epoch_seconds(ts).unwrap()).unwrap()
    }

    fn source() -> Arc<SimulatedSource> {
        Arc::new(SimulatedSource::new(Coordinate::new(0.0, 0.0).unwrap()))
    }

    fn drain(subscription: &mut Subscription) -> Vec<TrackingEvent> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }

    async fn start(
        repository: Arc<dyn LocationRepository>,
        source: &Arc<SimulatedSource>,
    ) -> (TrackingEngine, Subscription) {
        let (engine, subscription) =
            TrackingEngine::start(EngineConfig::default(), repository, source.clone()).await;
        source.attach(engine.source_sink());
        (engine, subscription)
    }

    /// Wraps a memory store and fails the operations it is told to fail.
    #[derive(Default)]
    struct FlakyRepository {
        inner: MemoryLocationRepository,
        fail_save: bool,
        fail_load: bool,
    }

    impl LocationRepository for FlakyRepository {
        fn save(&self, history: &[TrackedPoint]) -> Result<(), StorageError> {
            if self.fail_save {
                return Err(StorageError::Unavailable("save refused".to_string()));
            }
            self.inner.save(history)
        }

        fn load(&self) -> Result<Vec<TrackedPoint>, StorageError> {
            if self.fail_load {
                return Err(StorageError::Unavailable("load refused".to_string()));
            }
            self.inner.load()
        }

        fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear()
        }
    }

    #[tokio::test]
    async fn test_restore_skips_malformed_entry() {
        let repository = Arc::new(MemoryLocationRepository::with_raw(json!([
            { "latitude": 1.0, "longitude": 1.0, "timestamp": 1.0 },
            { "latitude": 2.0, "longitude": 2.0, "timestamp": 2.0 },
            { "latitude": 2.5, "timestamp": 2.5 },
            { "latitude": 3.0, "longitude": 3.0, "timestamp": 3.0 },
        ])));
        let source = source();
        let (engine, mut events) = start(repository, &source).await;

        assert_eq!(
            engine.history().await.unwrap(),
            vec![point(1.0, 1.0, 1.0), point(2.0, 2.0, 2.0), point(3.0, 3.0, 3.0)]
        );
        // Restoring is silent
        assert!(drain(&mut events).is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_restored_last_point_is_reference() {
        let repository = Arc::new(MemoryLocationRepository::new());
        repository.save(&[point(0.0, 0.0, 1.0)]).unwrap();
        let source = source();
        let (engine, _events) = start(repository, &source).await;

        engine.start_tracking().await.unwrap();
        let sink = engine.source_sink();
        sink.sample(point(0.0, 0.0000089, 2.0)).unwrap();
        sink.sample(point(0.0, 0.000009, 3.0)).unwrap();

        assert_eq!(
            engine.history().await.unwrap(),
            vec![point(0.0, 0.0, 1.0), point(0.0, 0.000009, 3.0)]
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_tracking_twice() {
        let source = source();
        let (engine, mut events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;

        engine.start_tracking().await.unwrap();
        engine.start_tracking().await.unwrap();

        assert!(engine.is_tracking().await.unwrap());
        assert_eq!(drain(&mut events), vec![TrackingEvent::TrackingToggled(true)]);
        assert_eq!(
            source.commands(),
            vec![SourceCommand::StartUpdates(DeliveryMode::Continuous)]
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_tracking_records_and_persists() {
        let repository = Arc::new(MemoryLocationRepository::new());
        let source = source();
        let (engine, mut events) = start(repository.clone(), &source).await;

        engine.start_tracking().await.unwrap();
        let first = source.simulate_movement(100.0, 45.0);
        let second = source.simulate_movement(0.5, 45.0);
        let third = source.simulate_movement(100.0, 45.0);

        let history = engine.history().await.unwrap();
        assert_eq!(history, vec![first, third]);
        assert_eq!(engine.current_position().await.unwrap(), Some(third));

        assert_eq!(
            drain(&mut events),
            vec![
                TrackingEvent::TrackingToggled(true),
                TrackingEvent::PositionUpdated(first),
                TrackingEvent::TrackedPointAdded(first),
                TrackingEvent::PositionUpdated(second),
                TrackingEvent::PositionUpdated(third),
                TrackingEvent::TrackedPointAdded(third),
            ]
        );

        engine.flush().await.unwrap();
        assert_eq!(repository.load().unwrap(), history);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_then_sample() {
        let source = source();
        let (engine, mut events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;

        engine.start_tracking().await.unwrap();
        let recorded = source.simulate_movement(10.0, 0.0);
        engine.stop_tracking().await.unwrap();
        drain(&mut events);

        // Raw delivery continues in passive mode
        assert_eq!(source.delivery(), Some(DeliveryMode::Passive));
        let idle = source.simulate_movement(10.0, 0.0);

        assert_eq!(engine.current_position().await.unwrap(), Some(idle));
        assert_eq!(engine.history().await.unwrap(), vec![recorded]);
        assert_eq!(drain(&mut events), vec![TrackingEvent::PositionUpdated(idle)]);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_not_determined_then_denied() {
        let source = Arc::new(
            SimulatedSource::new(Coordinate::new(0.0, 0.0).unwrap())
                .with_permission_response(AuthorizationStatus::Denied),
        );
        let (engine, mut events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;

        engine
            .source_sink()
            .authorization_changed(AuthorizationStatus::NotDetermined)
            .unwrap();

        // The source answers the permission request with a denial
        let mut received = Vec::new();
        while received.len() < 3 {
            received.push(events.recv().await.unwrap());
        }

        assert_eq!(
            received,
            vec![
                TrackingEvent::AuthorizationChanged(AuthorizationStatus::NotDetermined),
                TrackingEvent::AuthorizationChanged(AuthorizationStatus::Denied),
                TrackingEvent::ErrorRaised(TrackingError::PermissionDenied),
            ]
        );
        assert_eq!(source.commands(), vec![SourceCommand::RequestPermission]);
        assert_eq!(source.delivery(), None);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_granted_starts_passive_updates() {
        let source = source();
        let (engine, _events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;

        engine.request_permission().await.unwrap();
        // Let the granted status loop back through the sink
        engine.is_tracking().await.unwrap();

        assert_eq!(
            source.commands(),
            vec![
                SourceCommand::RequestPermission,
                SourceCommand::StartUpdates(DeliveryMode::Passive),
            ]
        );

        engine.stop_updates().await.unwrap();
        assert_eq!(source.delivery(), None);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_clears_storage() {
        let repository = Arc::new(MemoryLocationRepository::new());
        let source = source();
        let (engine, mut events) = start(repository.clone(), &source).await;

        engine.start_tracking().await.unwrap();
        source.simulate_movement(5.0, 0.0);
        source.simulate_movement(5.0, 0.0);
        engine.reset().await.unwrap();

        assert!(engine.history().await.unwrap().is_empty());
        assert!(engine.is_tracking().await.unwrap());
        assert!(engine.current_position().await.unwrap().is_some());
        assert_eq!(drain(&mut events).last(), Some(&TrackingEvent::HistoryCleared));

        engine.flush().await.unwrap();
        assert!(repository.load().unwrap().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_save_failure_keeps_history() {
        let repository = Arc::new(FlakyRepository {
            fail_save: true,
            ..Default::default()
        });
        let source = source();
        let (engine, mut events) = start(repository, &source).await;

        engine.start_tracking().await.unwrap();
        let recorded = source.simulate_movement(5.0, 0.0);

        let mut error = None;
        while error.is_none() {
            if let Some(TrackingEvent::ErrorRaised(e)) = events.recv().await {
                error = Some(e);
            }
        }

        assert_eq!(error, Some(TrackingError::SaveFailed));
        assert_eq!(engine.history().await.unwrap(), vec![recorded]);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_load_failure_starts_empty() {
        let repository = Arc::new(FlakyRepository {
            fail_load: true,
            ..Default::default()
        });
        let source = source();
        let (engine, mut events) = start(repository, &source).await;

        assert_eq!(
            events.recv().await,
            Some(TrackingEvent::ErrorRaised(TrackingError::LoadFailed))
        );
        assert!(engine.history().await.unwrap().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_source_failure_forwarded() {
        let source = source();
        let (engine, mut events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;

        engine
            .source_sink()
            .failed(crate::source::SourceFailure::LocationUnknown)
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(TrackingEvent::ErrorRaised(TrackingError::LocationUnavailable))
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_every_observer_sees_every_event() {
        let source = source();
        let (engine, first) = start(Arc::new(MemoryLocationRepository::new()), &source).await;
        let second = engine.subscribe();

        engine.start_tracking().await.unwrap();
        engine.stop_tracking().await.unwrap();
        engine.shutdown().await;

        let expected = vec![
            TrackingEvent::TrackingToggled(true),
            TrackingEvent::TrackingToggled(false),
        ];
        let first: Vec<TrackingEvent> = first.into_stream().collect().await;
        let second: Vec<TrackingEvent> = second.into_stream().collect().await;
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let repository = Arc::new(MemoryLocationRepository::new());
        let source = source();

        let (engine, _events) = start(repository.clone(), &source).await;
        engine.start_tracking().await.unwrap();
        source.simulate_movement(50.0, 10.0);
        source.simulate_movement(50.0, 10.0);
        let history = engine.history().await.unwrap();
        engine.shutdown().await;

        let (restarted, _events) = start(repository, &source).await;
        assert_eq!(restarted.history().await.unwrap(), history);
        assert!(!restarted.is_tracking().await.unwrap());
        assert!(restarted.current_position().await.unwrap().is_none());

        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_threshold_uses_default() {
        let source = source();
        let config = EngineConfig::builder().threshold_meters(f64::NAN).build();
        let (engine, _events) = TrackingEngine::start(
            config,
            Arc::new(MemoryLocationRepository::new()),
            source.clone(),
        )
        .await;

        engine.start_tracking().await.unwrap();
        let sink = engine.source_sink();
        sink.sample(point(0.0, 0.0, 1.0)).unwrap();
        sink.sample(point(0.0, 0.0000045, 2.0)).unwrap();
        sink.sample(point(1.0, 0.0, 3.0)).unwrap();

        assert_eq!(
            engine.history().await.unwrap(),
            vec![point(0.0, 0.0, 1.0), point(1.0, 0.0, 3.0)]
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_history_survives_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracked.json");
        let source = source();

        let (engine, _events) =
            start(Arc::new(FileLocationRepository::new(&path)), &source).await;
        engine.start_tracking().await.unwrap();
        for _ in 0..3 {
            source.simulate_movement(25.0, 60.0);
        }
        let history = engine.history().await.unwrap();
        assert_eq!(history.len(), 3);
        engine.shutdown().await;

        let (restarted, mut events) =
            start(Arc::new(FileLocationRepository::new(&path)), &source).await;
        assert_eq!(restarted.history().await.unwrap(), history);
        assert!(drain(&mut events).is_empty());

        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_closed_after_shutdown() {
        let source = source();
        let (engine, _events) = start(Arc::new(MemoryLocationRepository::new()), &source).await;
        let sink = engine.source_sink();

        engine.shutdown().await;
        assert!(sink.sample(point(1.0, 1.0, 1.0)).is_err());
    }
}
