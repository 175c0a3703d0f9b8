use {async_trait::async_trait, wagate_common::TenantId};

use crate::model::TenantRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a tenant with this token already exists")]
    DuplicateToken,
    #[error("tenant {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Tenant persistence. Every setter is a single atomic update; callers own
/// read-modify-write ordering.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create(&self, name: &str, token: &str) -> Result<TenantRecord, StoreError>;
    async fn get_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, StoreError>;
    async fn get_by_token(&self, token: &str) -> Result<Option<TenantRecord>, StoreError>;
    async fn list(&self) -> Result<Vec<TenantRecord>, StoreError>;
    /// Tenants whose last known state was connected.
    async fn connected(&self) -> Result<Vec<TenantRecord>, StoreError>;
    async fn set_jid(&self, id: TenantId, jid: &str) -> Result<(), StoreError>;
    async fn set_pairing_code(&self, id: TenantId, code: &str) -> Result<(), StoreError>;
    async fn set_connected(&self, id: TenantId, connected: bool) -> Result<(), StoreError>;
    async fn set_webhook(&self, id: TenantId, url: &str) -> Result<(), StoreError>;
    async fn set_events(&self, id: TenantId, events: &str) -> Result<(), StoreError>;
    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError>;
}
