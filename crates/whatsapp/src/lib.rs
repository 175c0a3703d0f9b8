//! WhatsApp protocol client speaking to an external protocol bridge.
//!
//! Each tenant gets its own WebSocket to the bridge. Requests are JSON
//! frames with a numeric `id` answered by a frame carrying the same id;
//! protocol events and pairing signals are pushed unsolicited.

pub mod bridge;
pub mod frame;

pub use bridge::{BridgeClient, BridgeClientFactory};
