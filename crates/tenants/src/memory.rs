use std::collections::BTreeMap;

use {async_trait::async_trait, tokio::sync::RwLock, wagate_common::TenantId};

use crate::{
    model::{DEFAULT_EVENTS, TenantRecord},
    store::{StoreError, TenantStore},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    tenants: BTreeMap<TenantId, TenantRecord>,
}

/// Process-local tenant store, for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryTenantStore {
    inner: RwLock<Inner>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed record, replacing any with the same id.
    pub async fn insert(&self, record: TenantRecord) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(record.id.0);
        inner.tenants.insert(record.id, record);
    }

    async fn modify(
        &self,
        id: TenantId,
        f: impl FnOnce(&mut TenantRecord),
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .tenants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn create(&self, name: &str, token: &str) -> Result<TenantRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.tenants.values().any(|t| t.token == token) {
            return Err(StoreError::DuplicateToken);
        }
        inner.next_id += 1;
        let record = TenantRecord {
            id: TenantId(inner.next_id),
            name: name.to_string(),
            token: token.to_string(),
            webhook: String::new(),
            jid: String::new(),
            pairing_code: String::new(),
            connected: false,
            expiration: None,
            events: DEFAULT_EVENTS.to_string(),
        };
        inner.tenants.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.inner.read().await.tenants.get(&id).cloned())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tenants
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, StoreError> {
        Ok(self.inner.read().await.tenants.values().cloned().collect())
    }

    async fn connected(&self) -> Result<Vec<TenantRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tenants
            .values()
            .filter(|t| t.connected)
            .cloned()
            .collect())
    }

    async fn set_jid(&self, id: TenantId, jid: &str) -> Result<(), StoreError> {
        self.modify(id, |t| t.jid = jid.to_string()).await
    }

    async fn set_pairing_code(&self, id: TenantId, code: &str) -> Result<(), StoreError> {
        self.modify(id, |t| t.pairing_code = code.to_string()).await
    }

    async fn set_connected(&self, id: TenantId, connected: bool) -> Result<(), StoreError> {
        self.modify(id, |t| t.connected = connected).await
    }

    async fn set_webhook(&self, id: TenantId, url: &str) -> Result<(), StoreError> {
        self.modify(id, |t| t.webhook = url.to_string()).await
    }

    async fn set_events(&self, id: TenantId, events: &str) -> Result<(), StoreError> {
        self.modify(id, |t| t.events = events.to_string()).await
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.tenants.len();
        inner.tenants.retain(|_, t| t.token != token);
        if inner.tenants.len() == before {
            return Err(StoreError::NotFound(token.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_sequential_and_tokens_unique() {
        let store = InMemoryTenantStore::new();
        let a = store.create("a", "ta").await.unwrap();
        let b = store.create("b", "tb").await.unwrap();
        assert_eq!(a.id, TenantId(1));
        assert_eq!(b.id, TenantId(2));
        assert!(matches!(
            store.create("c", "ta").await,
            Err(StoreError::DuplicateToken)
        ));
    }

    #[tokio::test]
    async fn insert_advances_id_counter() {
        let store = InMemoryTenantStore::new();
        let mut rec = store.create("a", "ta").await.unwrap();
        rec.id = TenantId(10);
        rec.token = "t10".into();
        store.insert(rec).await;
        let next = store.create("b", "tb").await.unwrap();
        assert_eq!(next.id, TenantId(11));
    }
}
