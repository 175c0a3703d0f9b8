//! Session creation, lookup and teardown.

use std::sync::Arc;

use {
    futures::future::join_all,
    serde::Serialize,
    tracing::{info, warn},
    wagate_common::{SubscriptionSet, TenantId},
    wagate_tenants::TenantInfo,
    wagate_webhook::{DispatchError, build_http_client},
};

use crate::{
    error::SessionError,
    registry::SessionRegistry,
    services::SessionServices,
    state::{SessionState, StopReason},
    worker::Worker,
};

/// Point-in-time view of one tenant's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// `None` when no session is running.
    pub state: Option<SessionState>,
    pub connected: bool,
    pub logged_in: bool,
}

/// Outcome of [`SessionSupervisor::bootstrap`].
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub started: Vec<TenantId>,
    pub failed: Vec<(TenantId, String)>,
}

#[derive(Clone)]
pub struct SessionSupervisor {
    services: Arc<SessionServices>,
    registry: Arc<SessionRegistry>,
}

impl SessionSupervisor {
    pub fn new(services: Arc<SessionServices>) -> Self {
        Self {
            services,
            registry: SessionRegistry::new(),
        }
    }

    pub fn services(&self) -> &Arc<SessionServices> {
        &self.services
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Launch a worker for `tenant`. Returns as soon as it is registered.
    pub fn start_session(
        &self,
        tenant: TenantId,
        jid: Option<String>,
        token: &str,
        subs: SubscriptionSet,
    ) -> Result<(), SessionError> {
        let http = build_http_client(&self.services.http)
            .map_err(|e| SessionError::Dispatch(DispatchError::Request(e)))?;
        let reservation = self.registry.reserve(tenant, token)?;
        info!(tenant = %tenant, subscriptions = %subs, "starting session");
        let worker = Worker {
            tenant,
            token: token.to_string(),
            jid: jid.filter(|j| !j.is_empty()),
            subs,
            services: Arc::clone(&self.services),
            control: reservation.control,
            state: reservation.state,
            http,
            push_name: None,
        };
        tokio::spawn(worker.run(reservation.guard));
        Ok(())
    }

    /// Stop the session and wait for its teardown. Calling this again while
    /// teardown is in flight waits for the same teardown.
    pub async fn stop_session(&self, tenant: TenantId) -> Result<(), SessionError> {
        self.stop_with(tenant, StopReason::Requested).await
    }

    pub async fn stop_with(&self, tenant: TenantId, reason: StopReason) -> Result<(), SessionError> {
        let control = self
            .registry
            .control(tenant)
            .ok_or(SessionError::NotFound(tenant))?;
        info!(tenant = %tenant, reason = %reason, "stopping session");
        control.request_stop(reason);
        control.terminated().await;
        Ok(())
    }

    /// Restart every tenant that was connected when the process last ran.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, SessionError> {
        let tenants = self.services.store.connected().await?;
        info!(count = tenants.len(), "bootstrapping sessions");
        let mut report = BootstrapReport::default();
        for record in tenants {
            self.services.cache.seed(&record);
            let subs = record.subscriptions();
            let jid = record.known_jid().map(str::to_string);
            match self.start_session(record.id, jid, &record.token, subs) {
                Ok(()) => report.started.push(record.id),
                Err(e) => {
                    warn!(tenant = %record.id, error = %e, "failed to restore session");
                    report.failed.push((record.id, e.to_string()));
                },
            }
        }
        Ok(report)
    }

    pub fn status(&self, tenant: TenantId) -> SessionStatus {
        let state = self.registry.state(tenant);
        SessionStatus {
            state,
            connected: state == Some(SessionState::Connected),
            logged_in: state.is_some_and(SessionState::is_logged_in),
        }
    }

    /// Start the tenant's session and store its new subscription list.
    ///
    /// The session slot is reserved first, so a losing concurrent connect
    /// never overwrites the running session's subscriptions.
    pub async fn connect_tenant(
        &self,
        info: &TenantInfo,
        subscribe: &[String],
    ) -> Result<SubscriptionSet, SessionError> {
        let subs = SubscriptionSet::from_names(subscribe);
        let jid = (!info.jid.is_empty()).then(|| info.jid.clone());
        self.start_session(info.id, jid, &info.token, subs.clone())?;
        let persisted = self
            .services
            .cache
            .set_events(
                self.services.store.as_ref(),
                info.id,
                &info.token,
                &subs.to_spec(),
            )
            .await;
        if let Err(e) = persisted {
            warn!(tenant = %info.id, error = %e, "failed to persist subscriptions, stopping session");
            if let Err(stop) = self.stop_session(info.id).await {
                warn!(tenant = %info.id, error = %stop, "stop after failed connect");
            }
            return Err(e.into());
        }
        Ok(subs)
    }

    /// Tear down any live session, then delete the tenant.
    pub async fn delete_tenant(&self, token: &str) -> Result<(), SessionError> {
        if let Some(info) = self
            .services
            .cache
            .resolve(self.services.store.as_ref(), token)
            .await?
        {
            match self.stop_session(info.id).await {
                Ok(()) | Err(SessionError::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        self.services.store.delete_by_token(token).await?;
        self.services.cache.remove(token);
        info!("tenant deleted");
        Ok(())
    }

    /// Disconnect every session without clearing the connected flags.
    pub async fn shutdown(&self) {
        let tenants = self.registry.tenants();
        if tenants.is_empty() {
            return;
        }
        info!(count = tenants.len(), "shutting down sessions");
        join_all(
            tenants
                .into_iter()
                .map(|tenant| self.stop_with(tenant, StopReason::Shutdown)),
        )
        .await;
    }
}
