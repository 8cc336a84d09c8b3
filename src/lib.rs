pub mod distance;
pub mod engine;
pub mod error;
pub mod event;
pub mod geocode;
pub mod point;
pub mod repository;
pub mod session;
pub mod source;
pub mod state_machine;

pub use distance::{DEFAULT_DISTANCE_THRESHOLD_M, distance_meters, should_record};
pub use engine::{EngineConfig, Subscription, TrackingEngine};
pub use error::{ErrorKind, TrackingError};
pub use event::TrackingEvent;
pub use geocode::{GeocodeGateway, Placemark, PlacemarkGateway, ReverseGeocoder, format_address};
pub use point::{Coordinate, Timestamp, TrackedPoint};
pub use repository::{FileLocationRepository, LocationRepository, MemoryLocationRepository};
pub use session::SessionId;
pub use source::{
    AuthorizationStatus, DeliveryMode, PositionSource, SimulatedSource, SourceCommand, SourceSink,
};
