//! Election lifecycle.
//!
//! `not_started -> voting <-> paused -> finished`, with an administrative
//! reset back to `not_started` from anywhere. Reconciliation consults
//! [`ElectionStateMachine::sync_allowed`] and other components follow
//! transitions through [`ElectionStateMachine::subscribe`].

pub mod error;
pub mod machine;

pub use error::ElectionError;
pub use machine::{ElectionAction, ElectionStateMachine};
