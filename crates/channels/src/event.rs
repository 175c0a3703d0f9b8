//! Typed protocol events as delivered by a [`ProtocolClient`](crate::ProtocolClient).

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::debug,
};

/// Every event a protocol client can emit. Frames whose `type` is not one
/// of the known variants become [`ProtocolEvent::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    Connected {
        #[serde(default, rename = "pushName")]
        push_name: String,
    },
    /// Transport dropped; the client reconnects on its own.
    Disconnected,
    PushNameSetting {
        #[serde(default, rename = "pushName")]
        push_name: String,
    },
    PairSuccess(PairEvent),
    PairError(PairEvent),
    #[serde(rename = "QR")]
    Qr {
        #[serde(default)]
        codes: Vec<String>,
    },
    LoggedOut {
        #[serde(default, rename = "onConnect")]
        on_connect: bool,
        #[serde(default)]
        reason: String,
    },
    StreamReplaced,
    Message(MessageEvent),
    Receipt(ReceiptEvent),
    Presence(PresenceEvent),
    ChatPresence(ChatPresenceEvent),
    HistorySync {
        #[serde(default)]
        data: Value,
    },
    AppStateSyncComplete {
        name: String,
        #[serde(default, rename = "pushName")]
        push_name: String,
    },
    AppState {
        #[serde(default)]
        index: Vec<String>,
    },
    CallOffer(CallEvent),
    CallAccept(CallEvent),
    CallTerminate(CallEvent),
    CallOfferNotice(CallEvent),
    CallRelayLatency(CallEvent),
    #[serde(skip)]
    Unknown { kind: String, payload: Value },
}

impl ProtocolEvent {
    /// Decode one event frame, keeping unrecognized ones as `Unknown`.
    pub fn from_frame(frame: Value) -> Self {
        match serde_json::from_value::<Self>(frame.clone()) {
            Ok(event) => event,
            Err(e) => {
                let kind = frame
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                debug!(kind = %kind, error = %e, "unrecognized protocol event");
                Self::Unknown {
                    kind,
                    payload: frame,
                }
            },
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Connected { .. } => "Connected",
            Self::Disconnected => "Disconnected",
            Self::PushNameSetting { .. } => "PushNameSetting",
            Self::PairSuccess(_) => "PairSuccess",
            Self::PairError(_) => "PairError",
            Self::Qr { .. } => "QR",
            Self::LoggedOut { .. } => "LoggedOut",
            Self::StreamReplaced => "StreamReplaced",
            Self::Message(_) => "Message",
            Self::Receipt(_) => "Receipt",
            Self::Presence(_) => "Presence",
            Self::ChatPresence(_) => "ChatPresence",
            Self::HistorySync { .. } => "HistorySync",
            Self::AppStateSyncComplete { .. } => "AppStateSyncComplete",
            Self::AppState { .. } => "AppState",
            Self::CallOffer(_) => "CallOffer",
            Self::CallAccept(_) => "CallAccept",
            Self::CallTerminate(_) => "CallTerminate",
            Self::CallOfferNotice(_) => "CallOfferNotice",
            Self::CallRelayLatency(_) => "CallRelayLatency",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairEvent {
    /// Newly assigned protocol identity.
    pub id: String,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: String,
    pub chat: String,
    pub sender: String,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub push_name: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Audio,
    Document,
    Video,
    Sticker,
    #[serde(other)]
    Other,
}

impl MediaKind {
    /// Kinds whose bytes are fetched and stored before dispatch.
    pub fn is_downloaded(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Document)
    }
}

/// Reference to media embedded in a message. `handle` is opaque to everything
/// but the client that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub kind: MediaKind,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default)]
    pub handle: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub info: MessageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    /// Raw message content as the client decoded it.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub message: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptKind {
    Delivered,
    Read,
    ReadSelf,
    Played,
    PlayedSelf,
    Sender,
    Retry,
    Inactive,
    ServerError,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEvent {
    pub kind: ReceiptKind,
    #[serde(default)]
    pub message_ids: Vec<String>,
    #[serde(default)]
    pub chat: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub from: String,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPresenceEvent {
    pub chat: String,
    #[serde(default)]
    pub sender: String,
    /// `composing` or `paused`.
    pub state: String,
    /// Empty for text, `audio` while recording.
    #[serde(default)]
    pub media: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub call_id: String,
}
