pub mod tracking;
pub mod wrappers;

/// The [`StateMachine`] trait provides calling semantics and indicates the upholding of invariants
/// that guarantee deterministic behavior.
///
/// # Functionality
/// A state machine consumes a single [`Input`](StateMachine::Input) type and produces a single
/// [`Output`](StateMachine::Output) type. Both are usually enums grouping every kind of input and
/// output the machine understands. [`process_input`](StateMachine::process_input) dispatches an
/// input variant to the method that handles it and [`poll_output`](StateMachine::poll_output)
/// hands back whatever output has become available, one item at a time.
///
/// Keeping the dispatch in this trait lets the machine itself stay focused on its logic, while a
/// runner (see [`TrackingEngine`](crate::engine::TrackingEngine)) owns the machine, feeds it
/// input and carries out the output.
///
/// # Invariants
/// A [`StateMachine`] must be pure: its behavior depends only on the inputs it has been given.
/// Implementors *must* uphold all of the following.
///
/// ## No Interior Mutability
/// Data is either immutable or mutable only through `&mut` access. No [`std::cell`] containers,
/// no [`std::sync`] locks and no shared ownership through [`Rc`](std::rc::Rc) or
/// [`Arc`](std::sync::Arc). `&'static` references to values without interior mutability are
/// allowed.
///
/// ## No IO
/// No [`std::io`], [`std::net`], file system access or anything that wraps them. Persistence and
/// device access are expressed as output for the runner to perform, and their outcomes come back
/// as input.
///
/// ### No System Time
/// Reading [`std::time::Instant::now`] or [`std::time::SystemTime`] makes two otherwise identical
/// executions diverge. Time values arrive through input (for instance, the timestamp carried by a
/// position sample).
///
/// ### No System RNG
/// Randomness must be seeded deterministically through input.
///
/// ## No Concurrency
/// No threads and no async. The runner decides on which task the machine executes and guarantees
/// that all input is delivered serially.
///
/// ## No Blocking
/// Every call returns promptly. Long running computations are forbidden as they would stall the
/// runner's event loop.
///
/// # Side Effects
/// Logging is allowed as long as the logic of the machine never depends on its outcome.
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Process the provided `input` into the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
