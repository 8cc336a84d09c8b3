use std::collections::VecDeque;

use tracing::debug;

use super::StateMachine;
use crate::distance::{DEFAULT_DISTANCE_THRESHOLD_M, should_record};
use crate::error::TrackingError;
use crate::event::TrackingEvent;
use crate::point::TrackedPoint;
use crate::source::{AuthorizationStatus, DeliveryMode, SourceCommand, SourceEvent, SourceFailure};

/// The tracking state of one session.
///
/// Every raw sample refreshes the current position. While tracking, samples that lie at least
/// the distance threshold away from the last recorded point are appended to history. The last
/// recorded point is always the last element of history.
pub struct TrackingMachine {
    threshold_meters: f64,
    is_tracking: bool,
    current_position: Option<TrackedPoint>,
    history: Vec<TrackedPoint>,
    pending: VecDeque<TrackingOutput>,
}

/// A command issued to the tracking machine by an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingCommand {
    RequestPermission,
    StartTracking,
    StopTracking,
    /// Clear history. Any confirmation is the caller's business.
    Reset,
    StartUpdates,
    StopUpdates,
}

/// A storage operation that failed after the machine requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageFailure {
    Save(String),
    Load(String),
    Clear(String),
}

/// A storage operation requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageRequest {
    /// Replace persisted history with this snapshot.
    Save(Vec<TrackedPoint>),
    Clear,
}

pub enum TrackingInput {
    Command(TrackingCommand),
    Authorization(AuthorizationStatus),
    Sample(TrackedPoint),
    SourceFailed(SourceFailure),
    StorageFailed(StorageFailure),
}

impl From<SourceEvent> for TrackingInput {
    fn from(event: SourceEvent) -> Self {
        match event {
            SourceEvent::Authorization(status) => TrackingInput::Authorization(status),
            SourceEvent::Sample(point) => TrackingInput::Sample(point),
            SourceEvent::Failure(failure) => TrackingInput::SourceFailed(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackingOutput {
    Event(TrackingEvent),
    Source(SourceCommand),
    Storage(StorageRequest),
}

impl TrackingMachine {
    /// Create an idle machine with empty history.
    pub fn new(threshold_meters: f64) -> Self {
        Self::restore(threshold_meters, Vec::new())
    }

    /// Create an idle machine continuing from previously persisted `history`.
    ///
    /// Restoring is silent: no output is produced.
    pub fn restore(threshold_meters: f64, history: Vec<TrackedPoint>) -> Self {
        Self {
            threshold_meters,
            is_tracking: false,
            current_position: None,
            history,
            pending: VecDeque::new(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    pub fn current_position(&self) -> Option<&TrackedPoint> {
        self.current_position.as_ref()
    }

    /// The reference point for the next distance decision.
    pub fn last_recorded_point(&self) -> Option<&TrackedPoint> {
        self.history.last()
    }

    pub fn history(&self) -> &[TrackedPoint] {
        &self.history
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn emit(&mut self, event: TrackingEvent) {
        self.pending.push_back(TrackingOutput::Event(event));
    }

    fn command_source(&mut self, command: SourceCommand) {
        self.pending.push_back(TrackingOutput::Source(command));
    }

    fn raise(&mut self, error: TrackingError) {
        self.emit(TrackingEvent::ErrorRaised(error));
    }

    fn delivery_mode(&self) -> DeliveryMode {
        if self.is_tracking {
            DeliveryMode::Continuous
        } else {
            DeliveryMode::Passive
        }
    }

    fn start_tracking(&mut self) {
        if self.is_tracking {
            return;
        }

        self.is_tracking = true;
        self.command_source(SourceCommand::StartUpdates(DeliveryMode::Continuous));
        self.emit(TrackingEvent::TrackingToggled(true));
    }

    fn stop_tracking(&mut self) {
        if !self.is_tracking {
            return;
        }

        // Raw delivery keeps running so the current position stays fresh.
        self.is_tracking = false;
        self.command_source(SourceCommand::StartUpdates(DeliveryMode::Passive));
        self.emit(TrackingEvent::TrackingToggled(false));
    }

    fn reset(&mut self) {
        self.history.clear();
        self.pending
            .push_back(TrackingOutput::Storage(StorageRequest::Clear));
        self.emit(TrackingEvent::HistoryCleared);
    }

    fn process_command(&mut self, command: TrackingCommand) {
        match command {
            TrackingCommand::RequestPermission => {
                self.command_source(SourceCommand::RequestPermission)
            }
            TrackingCommand::StartTracking => self.start_tracking(),
            TrackingCommand::StopTracking => self.stop_tracking(),
            TrackingCommand::Reset => self.reset(),
            TrackingCommand::StartUpdates => {
                let mode = self.delivery_mode();
                self.command_source(SourceCommand::StartUpdates(mode));
            }
            TrackingCommand::StopUpdates => self.command_source(SourceCommand::StopUpdates),
        }
    }

    fn process_authorization(&mut self, status: AuthorizationStatus) {
        self.emit(TrackingEvent::AuthorizationChanged(status));

        match status {
            AuthorizationStatus::Granted => {
                let mode = self.delivery_mode();
                self.command_source(SourceCommand::StartUpdates(mode));
            }
            AuthorizationStatus::Denied => self.raise(TrackingError::PermissionDenied),
            AuthorizationStatus::Restricted => self.raise(TrackingError::PermissionRestricted),
            AuthorizationStatus::NotDetermined => {
                self.command_source(SourceCommand::RequestPermission)
            }
        }
    }

    fn process_sample(&mut self, sample: TrackedPoint) {
        self.current_position = Some(sample);
        self.emit(TrackingEvent::PositionUpdated(sample));

        if !self.is_tracking {
            return;
        }

        let reference = self.history.last();
        if let Some(reference) = reference {
            if sample.timestamp() < reference.timestamp() {
                debug!(
                    sample = %sample,
                    last_recorded = %reference,
                    "Sample older than last recorded point, not recording"
                );
                return;
            }
        }

        if !should_record(&sample, reference, self.threshold_meters) {
            return;
        }

        self.history.push(sample);
        self.emit(TrackingEvent::TrackedPointAdded(sample));
        self.pending
            .push_back(TrackingOutput::Storage(StorageRequest::Save(self.history.clone())));
    }

    fn process_source_failure(&mut self, failure: SourceFailure) {
        let error = match failure {
            SourceFailure::Denied => TrackingError::PermissionDenied,
            SourceFailure::LocationUnknown => TrackingError::LocationUnavailable,
            SourceFailure::Other(detail) => TrackingError::Unknown(detail),
        };
        self.raise(error);
    }

    fn process_storage_failure(&mut self, failure: StorageFailure) {
        let error = match failure {
            StorageFailure::Save(_) => TrackingError::SaveFailed,
            StorageFailure::Load(_) => TrackingError::LoadFailed,
            StorageFailure::Clear(detail) => TrackingError::Storage(detail),
        };
        self.raise(error);
    }
}

impl Default for TrackingMachine {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD_M)
    }
}

impl StateMachine for TrackingMachine {
    type Input = TrackingInput;
    type Output = TrackingOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            TrackingInput::Command(command) => self.process_command(command),
            TrackingInput::Authorization(status) => self.process_authorization(status),
            TrackingInput::Sample(sample) => self.process_sample(sample),
            TrackingInput::SourceFailed(failure) => self.process_source_failure(failure),
            TrackingInput::StorageFailed(failure) => self.process_storage_failure(failure),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.pending.pop_front()
    }
}
