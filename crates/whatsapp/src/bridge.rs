use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::Engine as _,
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
        task::JoinHandle,
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, trace, warn},
    url::Url,
    wagate_channels::{
        ClientError, ClientFactory, ClientHandle, MediaRef, PairingSignal, ProtocolClient,
        ProtocolEvent,
    },
    wagate_common::TenantId,
};

use crate::frame::{self, ALREADY_PAIRED, Inbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingTx = oneshot::Sender<Result<Value, String>>;
type PairingSlot = Arc<Mutex<Option<mpsc::Sender<PairingSignal>>>>;

const EVENT_BUFFER: usize = 256;
/// Events held back while the consumer's channel is full. Beyond this the
/// newest pushes are dropped.
const BACKLOG_LIMIT: usize = EVENT_BUFFER;
const PAIRING_BUFFER: usize = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Command {
    cmd: &'static str,
    args: Value,
    response_tx: PendingTx,
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Opens one bridge socket per tenant.
pub struct BridgeClientFactory {
    base_url: Url,
    request_timeout: Duration,
}

impl BridgeClientFactory {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            request_timeout,
        })
    }

    fn session_url(&self, tenant: TenantId, jid: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("tenant", &tenant.to_string());
            if let Some(jid) = jid {
                q.append_pair("jid", jid);
            }
        }
        url
    }
}

#[async_trait]
impl ClientFactory for BridgeClientFactory {
    async fn create(
        &self,
        tenant: TenantId,
        jid: Option<&str>,
    ) -> Result<ClientHandle, ClientError> {
        let url = self.session_url(tenant, jid);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Transport(format!("bridge connect: {e}")))?;
        debug!(tenant = %tenant, "bridge socket open");

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(false));
        let pairing: PairingSlot = Arc::new(Mutex::new(None));

        let handler = tokio::spawn(handler_loop(
            tenant,
            ws,
            cmd_rx,
            events_tx,
            Arc::clone(&connected),
            Arc::clone(&pairing),
        ));

        let client = BridgeClient {
            tenant,
            cmd_tx,
            connected,
            pairing,
            request_timeout: self.request_timeout,
            handler,
        };
        Ok(ClientHandle {
            client: Arc::new(client),
            events,
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct BridgeClient {
    tenant: TenantId,
    cmd_tx: mpsc::Sender<Command>,
    connected: Arc<AtomicBool>,
    pairing: PairingSlot,
    request_timeout: Duration,
    handler: JoinHandle<()>,
}

impl BridgeClient {
    async fn request(&self, cmd: &'static str, args: Value) -> Result<Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command {
                cmd,
                args,
                response_tx: tx,
            })
            .await
            .map_err(|_| ClientError::Closed)?;

        let result = tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|_| ClientError::Closed)?;
        result.map_err(ClientError::Rejected)
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl ProtocolClient for BridgeClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.request("connect", json!({})).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Err(e) = self.request("disconnect", json!({})).await {
            debug!(tenant = %self.tenant, error = %e, "bridge disconnect failed");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingSignal>, ClientError> {
        let (tx, rx) = mpsc::channel(PAIRING_BUFFER);
        *lock(&self.pairing) = Some(tx);
        match self.request("pair", json!({})).await {
            Ok(_) => Ok(rx),
            Err(e) => {
                lock(&self.pairing).take();
                match e {
                    ClientError::Rejected(msg) if msg == ALREADY_PAIRED => {
                        Err(ClientError::AlreadyPaired)
                    },
                    other => Err(other),
                }
            },
        }
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, ClientError> {
        let args = json!({ "media": media });
        let result = self.request("download", args).await?;
        let encoded = result
            .as_str()
            .or_else(|| result.get("data").and_then(Value::as_str))
            .ok_or_else(|| ClientError::Malformed("download result has no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ClientError::Malformed(format!("download payload: {e}")))
    }

    async fn send_presence(&self, available: bool) -> Result<(), ClientError> {
        self.request("presence", json!({ "available": available }))
            .await
            .map(|_| ())
    }
}

// ── Socket loop ──────────────────────────────────────────────────────────────

/// Drop waiters whose caller gave up (request timeout) so an unresponsive
/// bridge cannot grow the map.
fn prune_abandoned(pending: &mut HashMap<u64, PendingTx>) {
    pending.retain(|_, tx| !tx.is_closed());
}

/// Owns the socket: writes commands, routes responses to waiters, and
/// forwards pushes. Events are buffered locally, up to [`BACKLOG_LIMIT`], so
/// a slow consumer never stalls response routing.
async fn handler_loop(
    tenant: TenantId,
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<ProtocolEvent>,
    connected: Arc<AtomicBool>,
    pairing: PairingSlot,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let next_id = AtomicU64::new(1);
    let mut backlog: VecDeque<ProtocolEvent> = VecDeque::new();
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let msg = frame::request(id, cmd.cmd, cmd.args);
                trace!(tenant = %tenant, cmd = cmd.cmd, id, "gateway -> bridge");
                prune_abandoned(&mut pending);
                pending.insert(id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    warn!(tenant = %tenant, "bridge socket write failed");
                    break;
                }
            }
            permit = events_tx.reserve(), if !backlog.is_empty() => {
                let Ok(permit) = permit else { break };
                if let Some(event) = backlog.pop_front() {
                    permit.send(event);
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!(tenant = %tenant, "bridge socket closed");
                        break;
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(tenant = %tenant, error = %e, "bridge socket error");
                        break;
                    },
                };
                match frame::parse(&text) {
                    Some(Inbound::Response { id, result }) => match pending.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(result);
                        },
                        None => debug!(tenant = %tenant, id, "response for unknown request id"),
                    },
                    Some(Inbound::Event(raw)) => {
                        let event = ProtocolEvent::from_frame(raw);
                        match &event {
                            ProtocolEvent::Connected { .. } => connected.store(true, Ordering::SeqCst),
                            ProtocolEvent::Disconnected | ProtocolEvent::LoggedOut { .. } => {
                                connected.store(false, Ordering::SeqCst)
                            },
                            _ => {},
                        }
                        if backlog.len() >= BACKLOG_LIMIT {
                            dropped += 1;
                            warn!(tenant = %tenant, event = event.name(), dropped, "event backlog full, dropping event");
                        } else {
                            backlog.push_back(event);
                        }
                    },
                    Some(Inbound::Pairing(signal)) => {
                        let tx = lock(&pairing).clone();
                        match tx {
                            Some(tx) => {
                                if let Err(e) = tx.try_send(signal) {
                                    warn!(tenant = %tenant, error = %e, "pairing signal dropped");
                                }
                            },
                            None => debug!(tenant = %tenant, "pairing signal without listener"),
                        }
                    },
                    None => trace!(tenant = %tenant, "ignoring unrecognized bridge frame"),
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = ws_tx.close().await;
    // Flush whatever is still buffered before the stream ends.
    for event in backlog {
        if events_tx.send(event).await.is_err() {
            break;
        }
    }
    lock(&pairing).take();
}
