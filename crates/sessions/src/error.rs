use {
    wagate_channels::ClientError,
    wagate_common::TenantId,
    wagate_media::AttachmentError,
    wagate_tenants::StoreError,
    wagate_webhook::DispatchError,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session for tenant {0} is already running")]
    AlreadyRunning(TenantId),
    #[error("no session for tenant {0}")]
    NotFound(TenantId),
    #[error("pairing timed out")]
    PairingTimeout,
    #[error("pairing failed: {0}")]
    PairingFailed(String),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error("protocol client failure: {0}")]
    ProtocolFatal(#[from] ClientError),
}
