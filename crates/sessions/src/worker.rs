//! One task per live session: connect (pairing first if needed), then
//! consume the protocol event stream until told to stop.

use std::{panic::AssertUnwindSafe, sync::Arc};

use {
    futures::FutureExt as _,
    tokio::sync::{mpsc, watch},
    tracing::{debug, error, info, warn},
    wagate_channels::{ClientHandle, ProtocolClient, ProtocolEvent},
    wagate_common::{Envelope, SubscriptionSet, TenantId},
    wagate_webhook::Delivery,
};

use crate::{
    error::SessionError,
    normalizer::{Disposition, Effect, normalize},
    pairing::{PairingMachine, Step},
    registry::{RegistrationGuard, SessionControl},
    services::SessionServices,
    state::{SessionState, StopReason},
};

enum Flow {
    Continue,
    Stop(StopReason),
}

pub(crate) struct Worker {
    pub tenant: TenantId,
    pub token: String,
    pub jid: Option<String>,
    pub subs: SubscriptionSet,
    pub services: Arc<SessionServices>,
    pub control: SessionControl,
    pub state: watch::Sender<SessionState>,
    pub http: reqwest::Client,
    pub push_name: Option<String>,
}

impl Worker {
    pub async fn run(mut self, guard: RegistrationGuard) {
        info!(tenant = %self.tenant, paired = self.jid.is_some(), "session starting");
        let (client, reason) = self.drive().await;
        let reason = self.control.stop_reason().unwrap_or(reason);

        self.set_state(SessionState::Disconnecting);
        if let Some(client) = client {
            client.disconnect().await;
        }
        if reason.clears_connected()
            && let Err(e) = self.services.store.set_connected(self.tenant, false).await
        {
            warn!(tenant = %self.tenant, error = %e, "failed to persist disconnected state");
        }
        guard.release();
        self.set_state(SessionState::Terminated);
        info!(tenant = %self.tenant, reason = %reason, "session terminated");
    }

    fn set_state(&self, state: SessionState) {
        debug!(tenant = %self.tenant, state = %state, "session state");
        self.state.send_replace(state);
    }

    fn requested(&self) -> StopReason {
        self.control.stop_reason().unwrap_or(StopReason::Requested)
    }

    async fn drive(&mut self) -> (Option<Arc<dyn ProtocolClient>>, StopReason) {
        let cancel = self.control.cancelled().clone();
        let created = tokio::select! {
            biased;
            () = cancel.cancelled() => return (None, self.requested()),
            res = self.services.factory.create(self.tenant, self.jid.as_deref()) => res,
        };
        let ClientHandle { client, mut events } = match created {
            Ok(handle) => handle,
            Err(e) => {
                error!(tenant = %self.tenant, error = %e, "failed to create protocol client");
                return (None, StopReason::ProtocolFatal);
            },
        };
        let reason = self.session(client.as_ref(), &mut events).await;
        (Some(client), reason)
    }

    async fn session(
        &mut self,
        client: &dyn ProtocolClient,
        events: &mut mpsc::Receiver<ProtocolEvent>,
    ) -> StopReason {
        let cancel = self.control.cancelled().clone();

        if self.jid.is_none() {
            self.set_state(SessionState::Pairing);
            if let Err(reason) = self.pair(client, events).await {
                return reason;
            }
        } else {
            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.requested(),
                res = client.connect() => res,
            };
            if let Err(e) = connected {
                error!(tenant = %self.tenant, error = %e, "connect failed");
                return StopReason::ProtocolFatal;
            }
        }

        self.set_state(SessionState::Connected);
        if let Err(e) = self.services.store.set_connected(self.tenant, true).await {
            warn!(tenant = %self.tenant, error = %e, "failed to persist connected state");
        }
        // Presence waits for the protocol's Connected event, which carries the push name.

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.requested(),
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => {
                        warn!(tenant = %self.tenant, "protocol event stream closed");
                        return StopReason::ProtocolFatal;
                    },
                },
            };
            if let Some(reason) = self.process(client, event).await {
                return reason;
            }
        }
    }

    /// Run the pairing flow to completion. Protocol events that arrive
    /// meanwhile are processed as usual.
    async fn pair(
        &mut self,
        client: &dyn ProtocolClient,
        events: &mut mpsc::Receiver<ProtocolEvent>,
    ) -> Result<(), StopReason> {
        let cancel = self.control.cancelled().clone();
        let mut machine = PairingMachine::new(self.tenant, &self.token, Arc::clone(&self.services));

        let begun = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.requested()),
            res = machine.begin(client) => res,
        };
        let mut signals = match begun {
            Ok(Some(rx)) => rx,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(tenant = %self.tenant, error = %e, "pairing could not start");
                return Err(match e {
                    SessionError::PairingFailed(_) => StopReason::PairingFailed,
                    _ => StopReason::ProtocolFatal,
                });
            },
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.requested()),
                signal = signals.recv() => {
                    let Some(signal) = signal else {
                        warn!(tenant = %self.tenant, "pairing channel closed");
                        return Err(StopReason::PairingFailed);
                    };
                    match machine.on_signal(signal).await {
                        Ok(Step::Continue(Some(envelope))) => self.dispatch(envelope),
                        Ok(Step::Continue(None)) => {},
                        Ok(Step::Paired { jid }) => {
                            if jid.is_some() {
                                self.jid = jid;
                            }
                            return Ok(());
                        },
                        Ok(Step::TimedOut) => return Err(StopReason::PairingTimeout),
                        Err(e) => {
                            error!(tenant = %self.tenant, error = %e, "pairing failed");
                            return Err(StopReason::PairingFailed);
                        },
                    }
                },
                ev = events.recv() => match ev {
                    Some(ev) => {
                        if let Some(reason) = self.process(client, ev).await {
                            return Err(reason);
                        }
                    },
                    None => {
                        warn!(tenant = %self.tenant, "protocol event stream closed during pairing");
                        return Err(StopReason::ProtocolFatal);
                    },
                },
            }
        }
    }

    /// Handle one event with panics contained to that event.
    async fn process(&mut self, client: &dyn ProtocolClient, event: ProtocolEvent) -> Option<StopReason> {
        let name = event.name().to_string();
        match AssertUnwindSafe(self.handle_event(client, event))
            .catch_unwind()
            .await
        {
            Ok(Flow::Continue) => None,
            Ok(Flow::Stop(reason)) => Some(reason),
            Err(_) => {
                error!(tenant = %self.tenant, event = %name, "event handler panicked, event skipped");
                None
            },
        }
    }

    async fn handle_event(&mut self, client: &dyn ProtocolClient, event: ProtocolEvent) -> Flow {
        let normalized = normalize(event);
        let mut stop = None;
        for effect in normalized.effects {
            match effect {
                Effect::Connected => {
                    if *self.state.borrow() == SessionState::Reconnecting {
                        self.set_state(SessionState::Connected);
                    }
                },
                Effect::Reconnecting => {
                    if *self.state.borrow() == SessionState::Connected {
                        self.set_state(SessionState::Reconnecting);
                    }
                },
                Effect::PushName(name) => self.push_name = Some(name),
                Effect::AnnouncePresence => self.announce_presence(client).await,
                Effect::PersistJid(jid) => {
                    if let Err(e) = self
                        .services
                        .cache
                        .set_jid(self.services.store.as_ref(), self.tenant, &self.token, &jid)
                        .await
                    {
                        warn!(tenant = %self.tenant, error = %e, "failed to persist jid");
                    }
                    self.jid = Some(jid);
                },
                Effect::LoggedOut => stop = Some(StopReason::LoggedOut),
            }
        }

        match normalized.disposition {
            Disposition::Drop(reason) => debug!(tenant = %self.tenant, reason, "event not dispatched"),
            disposition => {
                if let Some(envelope) = self.prepare(client, disposition).await {
                    self.dispatch(envelope);
                }
            },
        }

        match stop {
            Some(reason) => Flow::Stop(reason),
            None => Flow::Continue,
        }
    }

    /// Resolve attachments and history dumps. Returns `None` when the event
    /// is filtered out or its side payload could not be stored.
    async fn prepare(&self, client: &dyn ProtocolClient, disposition: Disposition) -> Option<Envelope> {
        let kind = disposition.kind()?;
        if !self.subs.contains(kind) {
            debug!(tenant = %self.tenant, kind = %kind, "not subscribed");
            return None;
        }
        match disposition {
            Disposition::Dispatch(envelope) => Some(envelope),
            Disposition::WithMedia {
                mut envelope,
                event_id,
                media,
            } => {
                let bytes = match client.download(&media).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(tenant = %self.tenant, id = %event_id, error = %e, "media download failed, event skipped");
                        return None;
                    },
                };
                match self
                    .services
                    .attachments
                    .save(
                        self.tenant,
                        &event_id,
                        &media.mime_type,
                        media.file_name.as_deref(),
                        &bytes,
                    )
                    .await
                {
                    Ok(path) => {
                        envelope.attachment = Some(path);
                        Some(envelope)
                    },
                    Err(e) => {
                        warn!(tenant = %self.tenant, id = %event_id, error = %e, "attachment save failed, event skipped");
                        None
                    },
                }
            },
            Disposition::WithHistory { envelope, data } => {
                match self.services.attachments.save_history(self.tenant, &data).await {
                    Ok(path) => {
                        let file = path
                            .file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        Some(envelope.with_field("file", file))
                    },
                    Err(e) => {
                        warn!(tenant = %self.tenant, error = %e, "history save failed, event skipped");
                        None
                    },
                }
            },
            Disposition::Drop(_) => None,
        }
    }

    /// Filter by subscription and hand the envelope to the dispatch queue.
    fn dispatch(&self, envelope: Envelope) {
        if !self.subs.contains(envelope.kind) {
            debug!(tenant = %self.tenant, kind = %envelope.kind, "not subscribed");
            return;
        }
        let url = self.services.cache.webhook(&self.token).unwrap_or_default();
        if url.is_empty() {
            warn!(tenant = %self.tenant, kind = %envelope.kind, "no webhook configured, event not delivered");
            return;
        }
        let data = match envelope.to_json() {
            Ok(data) => data,
            Err(e) => {
                warn!(tenant = %self.tenant, error = %e, "failed to encode envelope");
                return;
            },
        };
        let delivery = Delivery {
            tenant: self.tenant,
            url,
            token: self.token.clone(),
            data,
            attachment: envelope.attachment,
        };
        if let Err(e) = self.services.dispatch.enqueue(self.http.clone(), delivery) {
            warn!(tenant = %self.tenant, error = %e, "webhook delivery not queued");
        }
    }

    async fn announce_presence(&self, client: &dyn ProtocolClient) {
        let Some(name) = self.push_name.as_deref() else {
            return;
        };
        match client.send_presence(true).await {
            Ok(()) => debug!(tenant = %self.tenant, push_name = %name, "presence announced"),
            Err(e) => warn!(tenant = %self.tenant, error = %e, "failed to announce presence"),
        }
    }
}
