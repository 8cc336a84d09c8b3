//! Common wrappers that provide state machine dependencies implicitly.
//!
//! A [`StateMachine`](super::StateMachine) never reads the system itself. Whatever feeds it input
//! uses these helpers to draw values such as the current time from the system context.

pub mod input;
