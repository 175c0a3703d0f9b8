//! Boundary to the remote messaging protocol.
//!
//! A [`ClientFactory`] opens one [`ProtocolClient`] per tenant together with
//! the stream of typed [`ProtocolEvent`]s it produces. The session layer only
//! ever talks to these traits, so the wire protocol can live in a separate
//! crate (or a scripted fake in tests).

pub mod client;
pub mod event;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use {
    client::{ClientError, ClientFactory, ClientHandle, PairingSignal, ProtocolClient},
    event::{
        CallEvent, ChatPresenceEvent, MediaKind, MediaRef, MessageEvent, MessageInfo,
        PairEvent, PresenceEvent, ProtocolEvent, ReceiptEvent, ReceiptKind,
    },
};
