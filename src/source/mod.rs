//! The boundary between the tracking engine and whatever produces positions.
//!
//! A [`PositionSource`] receives commands from the engine. It reports back through a
//! [`SourceSink`], which may be used from any thread: events are queued and processed later on
//! the engine's own task, in the order they were delivered.

pub mod error;
pub mod simulated;

use tokio::sync::mpsc;

use crate::engine::EngineMessage;
use crate::point::TrackedPoint;

use self::error::SinkClosed;

pub use self::simulated::SimulatedSource;

/// The authorization state reported by a position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    /// The user has not decided yet.
    NotDetermined,
    /// Position delivery is allowed.
    Granted,
    /// The user refused access.
    Denied,
    /// Access is blocked by policy and cannot be granted by the user.
    Restricted,
}

/// How eagerly a source should deliver samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Low-power delivery that keeps the current position fresh.
    Passive,
    /// Continuous, best-accuracy delivery used while tracking.
    Continuous,
}

/// A command issued by the engine to its position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCommand {
    RequestPermission,
    /// Begin delivering samples, or switch an active source to the given mode.
    StartUpdates(DeliveryMode),
    StopUpdates,
}

/// A failure reported by a position source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    /// The source lost its authorization.
    Denied,
    /// No position could be determined right now.
    LocationUnknown,
    Other(String),
}

/// Everything a position source can report to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Authorization(AuthorizationStatus),
    Sample(TrackedPoint),
    Failure(SourceFailure),
}

/// A producer of raw position samples and authorization changes.
///
/// Commands are fire-and-forget. Their outcome, if any, arrives later through the
/// [`SourceSink`] handed to the source.
pub trait PositionSource: Send + Sync {
    fn request_permission(&self);

    fn start_updates(&self, mode: DeliveryMode);

    fn stop_updates(&self);

    /// Dispatch a [`SourceCommand`] to the matching method.
    fn execute(&self, command: SourceCommand) {
        match command {
            SourceCommand::RequestPermission => self.request_permission(),
            SourceCommand::StartUpdates(mode) => self.start_updates(mode),
            SourceCommand::StopUpdates => self.stop_updates(),
        }
    }
}

/// A cloneable, thread-safe handle through which a position source reports to the engine.
///
/// Events share the engine's inbox with commands, so an event delivered before a command is
/// issued is processed before that command.
#[derive(Debug, Clone)]
pub struct SourceSink {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl SourceSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { tx }
    }

    /// Queue `event` for the engine.
    pub fn deliver(&self, event: SourceEvent) -> Result<(), SinkClosed> {
        self.tx
            .send(EngineMessage::Source(event))
            .map_err(|_| SinkClosed)
    }

    pub fn authorization_changed(&self, status: AuthorizationStatus) -> Result<(), SinkClosed> {
        self.deliver(SourceEvent::Authorization(status))
    }

    pub fn sample(&self, point: TrackedPoint) -> Result<(), SinkClosed> {
        self.deliver(SourceEvent::Sample(point))
    }

    pub fn failed(&self, failure: SourceFailure) -> Result<(), SinkClosed> {
        self.deliver(SourceEvent::Failure(failure))
    }
}
