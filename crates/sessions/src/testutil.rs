use std::{sync::Arc, time::Duration};

use {
    tempfile::TempDir,
    wagate_channels::testing::ScriptedFactory,
    wagate_media::AttachmentStore,
    wagate_tenants::{InMemoryTenantStore, TenantInfoCache, TenantRecord, TenantStore},
    wagate_webhook::{DispatchQueue, HttpClientOptions},
};

use crate::{pairing::PairingOptions, services::SessionServices};

pub(crate) struct Harness {
    pub store: Arc<InMemoryTenantStore>,
    pub cache: TenantInfoCache,
    pub factory: Arc<ScriptedFactory>,
    pub dispatch: DispatchQueue,
    _dir: TempDir,
    services: Arc<SessionServices>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryTenantStore::new());
        let cache = TenantInfoCache::new();
        let factory = ScriptedFactory::new();
        let dir = tempfile::tempdir().unwrap();
        let (dispatch, _workers) = DispatchQueue::start(64, 2);
        let services = Arc::new(SessionServices {
            store: Arc::clone(&store) as Arc<dyn TenantStore>,
            cache: cache.clone(),
            factory: Arc::clone(&factory) as _,
            attachments: Arc::new(AttachmentStore::new(dir.path().join("files"))),
            dispatch: dispatch.clone(),
            http: HttpClientOptions {
                timeout: Duration::from_secs(2),
                ..HttpClientOptions::default()
            },
            pairing: PairingOptions {
                qr_size: 64,
                print_terminal: false,
            },
        });
        Self {
            store,
            cache,
            factory,
            dispatch,
            _dir: dir,
            services,
        }
    }

    pub fn services(&self) -> Arc<SessionServices> {
        Arc::clone(&self.services)
    }

    /// Create a tenant with `token` and `webhook`, seeded into the cache.
    pub async fn tenant(&self, token: &str, webhook: &str) -> TenantRecord {
        let record = self.store.create(token, token).await.unwrap();
        if !webhook.is_empty() {
            self.store.set_webhook(record.id, webhook).await.unwrap();
        }
        let record = self.store.get_by_id(record.id).await.unwrap().unwrap();
        self.cache.seed(&record);
        record
    }
}

/// Poll `check` every 5ms for up to two seconds.
pub(crate) async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within two seconds");
}
