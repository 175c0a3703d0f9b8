use std::{fmt, path::PathBuf, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::warn,
};

// ── Tenant identity ──────────────────────────────────────────────────────────

/// Numeric tenant id, assigned by persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ── Event kinds ──────────────────────────────────────────────────────────────

/// Wildcard subscription name.
pub const ALL_EVENTS: &str = "All";

/// Event type names a tenant can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    ReadReceipt,
    Presence,
    HistorySync,
    ChatPresence,
    SessionStatus,
    PairSuccess,
    PairError,
    #[serde(alias = "QR")]
    PairingCodeIssued,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::Message,
        EventKind::ReadReceipt,
        EventKind::Presence,
        EventKind::HistorySync,
        EventKind::ChatPresence,
        EventKind::SessionStatus,
        EventKind::PairSuccess,
        EventKind::PairError,
        EventKind::PairingCodeIssued,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "Message",
            Self::ReadReceipt => "ReadReceipt",
            Self::Presence => "Presence",
            Self::HistorySync => "HistorySync",
            Self::ChatPresence => "ChatPresence",
            Self::SessionStatus => "SessionStatus",
            Self::PairSuccess => "PairSuccess",
            Self::PairError => "PairError",
            Self::PairingCodeIssued => "PairingCodeIssued",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "QR" {
            return Ok(Self::PairingCodeIssued);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// ── Subscriptions ────────────────────────────────────────────────────────────

/// The set of event types a tenant receives through its webhook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionSet {
    #[default]
    All,
    /// Ordered, de-duplicated list of kinds.
    Only(Vec<EventKind>),
}

impl SubscriptionSet {
    /// Parse a persisted comma-separated subscription spec.
    ///
    /// An empty spec means [`SubscriptionSet::All`]. Unknown names are
    /// dropped with a warning; they never fail the parse.
    pub fn parse(spec: &str) -> Self {
        Self::from_names(spec.split(','))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kinds = Vec::new();
        let mut seen_any = false;
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            seen_any = true;
            if name == ALL_EVENTS {
                return Self::All;
            }
            match name.parse::<EventKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {},
                Err(e) => warn!(kind = name, error = %e, "event type discarded"),
            }
        }
        if !seen_any {
            return Self::All;
        }
        Self::Only(kinds)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(kinds) if kinds.is_empty())
    }

    /// Names in subscription order, `["All"]` for the wildcard.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::All => vec![ALL_EVENTS.to_string()],
            Self::Only(kinds) => kinds.iter().map(|k| k.as_str().to_string()).collect(),
        }
    }

    /// Comma-separated form, as persisted on the tenant record.
    pub fn to_spec(&self) -> String {
        self.names().join(",")
    }
}

impl fmt::Display for SubscriptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Canonical, dispatch-ready form of one protocol event.
///
/// Serializes as `{"type": .., "state": .., "event": {..}, ..extra}`; this
/// JSON is what the webhook receives in its `data` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "event")]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(rename = "attachmentPath", skip_serializing_if = "Option::is_none")]
    pub attachment: Option<PathBuf>,
}

impl Envelope {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            state: None,
            payload,
            extra: Map::new(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
