//! Gateway: HTTP surface over the session supervisor.
//!
//! Lifecycle:
//! 1. Load config, open the tenant database
//! 2. Build the session services (bridge client factory, attachment store,
//!    webhook dispatch queue) and the supervisor
//! 3. Bootstrap sessions for tenants that were connected at last exit
//! 4. Serve admin, tenant and health routes until Ctrl-C / SIGTERM
//! 5. Disconnect every session, leaving connected flags for the next start
//!
//! Session semantics live in `wagate-sessions`; handlers here only decode
//! requests and map errors onto status codes.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    error::ApiError,
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
