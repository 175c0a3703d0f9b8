//! Token-keyed mirror of the tenant fields event dispatch reads.
//!
//! Writers go through [`TenantInfoCache`] methods that persist first and
//! update the cache second, holding a write lock across both steps so two
//! writers cannot leave the cache and the database disagreeing.

use std::sync::Arc;

use {
    dashmap::DashMap,
    tokio::sync::Mutex,
    tracing::{debug, warn},
    wagate_common::{SubscriptionSet, TenantId},
};

use crate::{
    model::TenantRecord,
    store::{StoreError, TenantStore},
};

/// Denormalized snapshot of a tenant record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantInfo {
    pub id: TenantId,
    pub token: String,
    pub jid: String,
    pub webhook: String,
    pub events: String,
}

impl TenantInfo {
    pub fn subscriptions(&self) -> SubscriptionSet {
        SubscriptionSet::parse(&self.events)
    }
}

impl From<&TenantRecord> for TenantInfo {
    fn from(r: &TenantRecord) -> Self {
        Self {
            id: r.id,
            token: r.token.clone(),
            jid: r.jid.clone(),
            webhook: r.webhook.clone(),
            events: r.events.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct TenantInfoCache {
    entries: Arc<DashMap<String, TenantInfo>>,
    write_lock: Arc<Mutex<()>>,
}

impl TenantInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a record (startup, first lookup).
    pub fn seed(&self, record: &TenantRecord) {
        self.entries
            .insert(record.token.clone(), TenantInfo::from(record));
    }

    pub fn get(&self, token: &str) -> Option<TenantInfo> {
        self.entries.get(token).map(|e| e.value().clone())
    }

    /// Webhook URL for a token; `None` when the tenant is not cached.
    pub fn webhook(&self, token: &str) -> Option<String> {
        self.entries.get(token).map(|e| e.webhook.clone())
    }

    pub fn remove(&self, token: &str) -> Option<TenantInfo> {
        self.entries.remove(token).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached lookup, falling back to persistence and seeding on a miss.
    pub async fn resolve(
        &self,
        store: &dyn TenantStore,
        token: &str,
    ) -> Result<Option<TenantInfo>, StoreError> {
        if let Some(info) = self.get(token) {
            return Ok(Some(info));
        }
        let Some(record) = store.get_by_token(token).await? else {
            return Ok(None);
        };
        self.seed(&record);
        Ok(Some(TenantInfo::from(&record)))
    }

    pub async fn set_jid(
        &self,
        store: &dyn TenantStore,
        id: TenantId,
        token: &str,
        jid: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        store.set_jid(id, jid).await?;
        self.update(token, |info| info.jid = jid.to_string());
        Ok(())
    }

    pub async fn set_webhook(
        &self,
        store: &dyn TenantStore,
        id: TenantId,
        token: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        store.set_webhook(id, url).await?;
        self.update(token, |info| info.webhook = url.to_string());
        Ok(())
    }

    pub async fn set_events(
        &self,
        store: &dyn TenantStore,
        id: TenantId,
        token: &str,
        events: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        store.set_events(id, events).await?;
        self.update(token, |info| info.events = events.to_string());
        Ok(())
    }

    fn update(&self, token: &str, f: impl FnOnce(&mut TenantInfo)) {
        match self.entries.get_mut(token) {
            Some(mut entry) => {
                f(entry.value_mut());
                debug!(tenant = %entry.id, "tenant info cache updated");
            },
            None => warn!("no tenant info cached for token, cache not updated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::memory::InMemoryTenantStore};

    #[tokio::test]
    async fn resolve_seeds_on_miss() {
        let store = InMemoryTenantStore::new();
        let rec = store.create("a", "ta").await.unwrap();
        let cache = TenantInfoCache::new();
        assert!(cache.get("ta").is_none());

        let info = cache.resolve(&store, "ta").await.unwrap().unwrap();
        assert_eq!(info.id, rec.id);
        assert!(cache.get("ta").is_some());
        assert!(cache.resolve(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_hit_store_then_cache() {
        let store = InMemoryTenantStore::new();
        let rec = store.create("a", "ta").await.unwrap();
        let cache = TenantInfoCache::new();
        cache.seed(&rec);

        cache
            .set_webhook(&store, rec.id, "ta", "http://example/hook")
            .await
            .unwrap();
        cache
            .set_jid(&store, rec.id, "ta", "555@s.whatsapp.net")
            .await
            .unwrap();

        let persisted = store.get_by_id(rec.id).await.unwrap().unwrap();
        assert_eq!(persisted.webhook, "http://example/hook");
        assert_eq!(persisted.jid, "555@s.whatsapp.net");
        let cached = cache.get("ta").unwrap();
        assert_eq!(cached.webhook, "http://example/hook");
        assert_eq!(cached.jid, "555@s.whatsapp.net");
    }

    #[tokio::test]
    async fn failed_persist_leaves_cache_untouched() {
        let store = InMemoryTenantStore::new();
        let rec = store.create("a", "ta").await.unwrap();
        let cache = TenantInfoCache::new();
        cache.seed(&rec);

        let err = cache
            .set_webhook(&store, TenantId(99), "ta", "http://x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(cache.webhook("ta").as_deref(), Some(""));
    }
}
