//! Session lifecycle and event dispatch.
//!
//! The [`SessionSupervisor`] owns one worker task per connected tenant. A
//! worker opens a protocol client, runs the pairing flow when the tenant has
//! no identity yet, then turns every protocol event into an [`Envelope`]
//! that is filtered against the tenant's subscriptions and queued for
//! webhook delivery.
//!
//! [`Envelope`]: wagate_common::Envelope

pub mod error;
pub mod normalizer;
pub mod pairing;
pub mod registry;
pub mod services;
pub mod state;
pub mod supervisor;
mod worker;

#[cfg(test)]
mod testutil;

pub use {
    error::SessionError,
    pairing::{PairingMachine, PairingOptions, PairingState},
    registry::SessionRegistry,
    services::SessionServices,
    state::{SessionState, StopReason},
    supervisor::{BootstrapReport, SessionStatus, SessionSupervisor},
};
