//! Per-user questionnaire state machine
//!
//! Pure state transitions: the runtime feeds events in, applies the new
//! session and executes the returned effects against the gateway.

mod effect;
pub mod event;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use transition::{transition, TransitionError};
