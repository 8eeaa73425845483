// src/protocol/mod.rs
//! Scripted acquisition protocols
//!
//! A protocol is an ordered list of [`PhaseDefinition`]s. The
//! [`PhaseController`] turns each definition into a finalized [`Phase`], and
//! the [`ProtocolRunner`] strings the phases together into a session.

pub mod controller;
pub mod definition;
pub mod phase;
pub mod runner;

pub use controller::{
    CancelHandle, NoopObserver, PhaseController, PhaseOutcome, ProtocolEvent, ProtocolObserver,
    TickOutcome,
};
pub use definition::{PhaseDefinition, ProtocolDefinition};
pub use phase::{Phase, PhaseState};
pub use runner::{ProtocolRunner, RunOutcome};
