use std::sync::Arc;

use {
    wagate_channels::ClientFactory,
    wagate_media::AttachmentStore,
    wagate_tenants::{TenantInfoCache, TenantStore},
    wagate_webhook::{DispatchQueue, HttpClientOptions},
};

use crate::pairing::PairingOptions;

/// Process-wide collaborators every session worker needs. Built once at
/// startup and shared by reference.
pub struct SessionServices {
    pub store: Arc<dyn TenantStore>,
    pub cache: TenantInfoCache,
    pub factory: Arc<dyn ClientFactory>,
    pub attachments: Arc<AttachmentStore>,
    pub dispatch: DispatchQueue,
    pub http: HttpClientOptions,
    pub pairing: PairingOptions,
}
