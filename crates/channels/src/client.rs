use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc, wagate_common::TenantId};

use crate::event::{MediaRef, ProtocolEvent};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The device already has an identity, so no pairing codes will be issued.
    #[error("device is already paired")]
    AlreadyPaired,
    #[error("client is not connected")]
    NotConnected,
    #[error("request timed out")]
    Timeout,
    #[error("connection closed")]
    Closed,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// One step of the pairing flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingSignal {
    /// A fresh code to render and show to the user.
    Code(String),
    /// No scan happened in time.
    Timeout,
    /// Scan accepted. Carries the new identity when the client knows it here.
    Success { jid: Option<String> },
    /// Any other signal, logged and ignored.
    Other(String),
}

/// Connection to the messaging service for a single tenant.
///
/// Owned by exactly one session worker; implementations need not support
/// concurrent callers beyond what `Send + Sync` implies.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn connect(&self) -> Result<(), ClientError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Open the pairing code stream. Must be called before [`connect`](Self::connect)
    /// on a device without identity; fails with [`ClientError::AlreadyPaired`]
    /// otherwise.
    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingSignal>, ClientError>;

    /// Fetch (and decrypt) the bytes behind a media reference.
    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, ClientError>;

    /// Announce the account as available (`true`) or unavailable.
    async fn send_presence(&self, available: bool) -> Result<(), ClientError>;
}

/// A freshly opened client and its event stream.
pub struct ClientHandle {
    pub client: Arc<dyn ProtocolClient>,
    /// Ends when the connection is gone for good.
    pub events: mpsc::Receiver<ProtocolEvent>,
}

/// Opens clients. `jid` selects the stored device identity; `None` allocates
/// a new one that must be paired.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(
        &self,
        tenant: TenantId,
        jid: Option<&str>,
    ) -> Result<ClientHandle, ClientError>;
}
