//! Tenant id → live session map shared by request handlers and workers.
//!
//! An entry is inserted atomically before its worker is spawned and removed
//! by the worker itself on the way out (or by its [`RegistrationGuard`] if
//! the task dies). Handlers only ever get cloned [`SessionControl`]s; no map
//! reference is held across an await.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::debug,
    wagate_common::TenantId,
};

use crate::{
    error::SessionError,
    state::{SessionState, StopReason},
};

/// Handle used to observe and stop one session.
#[derive(Clone)]
pub struct SessionControl {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl SessionControl {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ask the worker to stop. The first reason wins.
    pub fn request_stop(&self, reason: StopReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(|p| p.into_inner());
            slot.get_or_insert(reason);
        }
        self.cancel.cancel();
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.reason.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve once the worker reports `Terminated` (or is gone).
    pub async fn terminated(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| *s == SessionState::Terminated).await;
    }
}

struct Slot {
    generation: u64,
    token: String,
    control: SessionControl,
}

/// What a successful reservation hands to the new worker.
pub(crate) struct Reservation {
    pub control: SessionControl,
    pub state: watch::Sender<SessionState>,
    pub guard: RegistrationGuard,
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<TenantId, Slot>,
    generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the slot for `tenant`, failing if a session already holds it.
    pub(crate) fn reserve(
        self: &Arc<Self>,
        tenant: TenantId,
        token: &str,
    ) -> Result<Reservation, SessionError> {
        match self.slots.entry(tenant) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRunning(tenant)),
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                let (state_tx, state_rx) = watch::channel(SessionState::Starting);
                let control = SessionControl {
                    cancel: CancellationToken::new(),
                    state: state_rx,
                    reason: Arc::new(Mutex::new(None)),
                };
                vacant.insert(Slot {
                    generation,
                    token: token.to_string(),
                    control: control.clone(),
                });
                debug!(tenant = %tenant, generation, "session slot reserved");
                Ok(Reservation {
                    control,
                    state: state_tx,
                    guard: RegistrationGuard {
                        registry: Arc::clone(self),
                        tenant,
                        generation,
                        released: false,
                    },
                })
            },
        }
    }

    fn release(&self, tenant: TenantId, generation: u64) {
        if self
            .slots
            .remove_if(&tenant, |_, slot| slot.generation == generation)
            .is_some()
        {
            debug!(tenant = %tenant, generation, "session slot released");
        }
    }

    pub fn control(&self, tenant: TenantId) -> Option<SessionControl> {
        self.slots.get(&tenant).map(|s| s.control.clone())
    }

    pub fn state(&self, tenant: TenantId) -> Option<SessionState> {
        self.slots.get(&tenant).map(|s| s.control.state())
    }

    pub fn contains(&self, tenant: TenantId) -> bool {
        self.slots.contains_key(&tenant)
    }

    pub fn token(&self, tenant: TenantId) -> Option<String> {
        self.slots.get(&tenant).map(|s| s.token.clone())
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self.slots.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Removes the registry slot when the worker is done with it.
pub(crate) struct RegistrationGuard {
    registry: Arc<SessionRegistry>,
    tenant: TenantId,
    generation: u64,
    released: bool,
}

impl RegistrationGuard {
    pub fn release(mut self) {
        self.registry.release(self.tenant, self.generation);
        self.released = true;
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(self.tenant, self.generation);
        }
    }
}
