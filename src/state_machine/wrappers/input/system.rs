use crate::point::Timestamp;

/// The [`SystemResource`] trait indicates that a type is a resource inherently provided by the
/// system context of the application.
///
/// Provides a single method [`generate`](SystemResource::generate) which takes no input, producing
/// an instance of the resource from only the implicit system context.
///
/// Producers of [`StateMachine`](crate::state_machine::StateMachine) input use this to stamp
/// values before handing them to the machine, which keeps the machine itself free of clock reads.
pub trait SystemResource {
    /// Produce an instance of this resource with no direct input, drawing only from the implicitly
    /// available global system context.
    fn generate() -> Self;
}

impl SystemResource for Timestamp {
    fn generate() -> Self {
        Timestamp::now()
    }
}
