//! Scripted protocol client for tests.
//!
//! [`ScriptedFactory`] hands out [`ScriptedClient`]s that record every call
//! and let the test push events and pairing signals at will.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, tokio::sync::mpsc, wagate_common::TenantId};

use crate::{
    client::{ClientError, ClientFactory, ClientHandle, PairingSignal, ProtocolClient},
    event::{MediaRef, ProtocolEvent},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A call observed by a [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    PairingChannel,
    Download(String),
    Presence(bool),
}

pub struct ScriptedClient {
    pub tenant: TenantId,
    pub jid: Option<String>,
    connected: AtomicBool,
    calls: Mutex<Vec<Call>>,
    events_tx: Mutex<Option<mpsc::Sender<ProtocolEvent>>>,
    pairing_tx: mpsc::Sender<PairingSignal>,
    pairing_rx: Mutex<Option<mpsc::Receiver<PairingSignal>>>,
    download: Mutex<Option<Vec<u8>>>,
    panic_download: AtomicBool,
    fail_connect: AtomicBool,
}

impl ScriptedClient {
    /// Push one protocol event into the worker's stream.
    pub async fn emit(&self, event: ProtocolEvent) {
        let tx = lock(&self.events_tx).clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Push one pairing signal.
    pub async fn pairing(&self, signal: PairingSignal) {
        let _ = self.pairing_tx.send(signal).await;
    }

    /// Drop the event sender, ending the stream as a dead connection would.
    pub fn close_stream(&self) {
        lock(&self.events_tx).take();
    }

    /// Bytes returned by subsequent downloads; `None` makes downloads fail.
    pub fn set_download(&self, bytes: Option<Vec<u8>>) {
        *lock(&self.download) = bytes;
    }

    /// Make subsequent downloads panic, as a buggy SDK callback would.
    pub fn panic_on_download(&self, panic: bool) {
        self.panic_download.store(panic, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.record(Call::Connect);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("scripted connect failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.record(Call::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingSignal>, ClientError> {
        self.record(Call::PairingChannel);
        if self.jid.is_some() {
            return Err(ClientError::AlreadyPaired);
        }
        lock(&self.pairing_rx)
            .take()
            .ok_or_else(|| ClientError::Rejected("pairing channel already taken".into()))
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, ClientError> {
        self.record(Call::Download(media.mime_type.clone()));
        if self.panic_download.load(Ordering::SeqCst) {
            panic!("scripted download panic");
        }
        lock(&self.download)
            .clone()
            .ok_or_else(|| ClientError::Rejected("scripted download failure".into()))
    }

    async fn send_presence(&self, available: bool) -> Result<(), ClientError> {
        self.record(Call::Presence(available));
        Ok(())
    }
}

/// Factory producing [`ScriptedClient`]s, one per `create` call.
#[derive(Default)]
pub struct ScriptedFactory {
    clients: Mutex<HashMap<TenantId, Vec<Arc<ScriptedClient>>>>,
    fail_create: AtomicBool,
    default_download: Mutex<Option<Vec<u8>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Download bytes preset on every client created from now on.
    pub fn set_download(&self, bytes: Option<Vec<u8>>) {
        *lock(&self.default_download) = bytes;
    }

    /// Number of clients created for `tenant` so far.
    pub fn created(&self, tenant: TenantId) -> usize {
        lock(&self.clients).get(&tenant).map_or(0, Vec::len)
    }

    /// Most recent client for `tenant`, if any.
    pub fn latest(&self, tenant: TenantId) -> Option<Arc<ScriptedClient>> {
        lock(&self.clients)
            .get(&tenant)
            .and_then(|list| list.last().cloned())
    }

    /// Wait up to two seconds for a client for `tenant` to be created.
    pub async fn wait_for(&self, tenant: TenantId) -> Arc<ScriptedClient> {
        for _ in 0..400 {
            if let Some(client) = self.latest(tenant) {
                return client;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no client created for tenant {tenant}");
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn create(
        &self,
        tenant: TenantId,
        jid: Option<&str>,
    ) -> Result<ClientHandle, ClientError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("scripted create failure".into()));
        }
        let (events_tx, events) = mpsc::channel(64);
        let (pairing_tx, pairing_rx) = mpsc::channel(16);
        let client = Arc::new(ScriptedClient {
            tenant,
            jid: jid.map(str::to_string),
            connected: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            events_tx: Mutex::new(Some(events_tx)),
            pairing_tx,
            pairing_rx: Mutex::new(Some(pairing_rx)),
            download: Mutex::new(lock(&self.default_download).clone()),
            panic_download: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
        });
        lock(&self.clients)
            .entry(tenant)
            .or_default()
            .push(Arc::clone(&client));
        Ok(ClientHandle { client, events })
    }
}
