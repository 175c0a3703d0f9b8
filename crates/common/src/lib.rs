//! Types shared by every wagate crate: tenant identity, event kinds,
//! subscription sets and the dispatch envelope.

pub mod types;

pub use types::{Envelope, EventKind, SubscriptionSet, TenantId};
