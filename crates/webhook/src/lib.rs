//! Webhook delivery: one best-effort POST per normalized event.
//!
//! Deliveries are queued on a bounded channel and drained by a fixed worker
//! pool. A full queue drops the delivery and counts it; nothing is retried.

pub mod client;
pub mod delivery;
pub mod queue;

pub use {
    client::{HttpClientOptions, build_http_client},
    delivery::{Delivery, DispatchError, deliver},
    queue::{DispatchQueue, DispatchStats, StatsSnapshot},
};
