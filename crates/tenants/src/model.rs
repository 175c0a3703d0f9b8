use {
    serde::{Deserialize, Serialize},
    wagate_common::{SubscriptionSet, TenantId},
};

/// Subscription spec stored on new tenants.
pub const DEFAULT_EVENTS: &str = "All";

/// One tenant as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    /// Opaque auth token, unique and immutable after creation.
    pub token: String,
    pub webhook: String,
    /// Protocol identity, empty until paired.
    pub jid: String,
    /// Last issued pairing code as a PNG data URI, empty when none is pending.
    pub pairing_code: String,
    pub connected: bool,
    pub expiration: Option<i64>,
    /// Comma-separated subscription spec.
    pub events: String,
}

impl TenantRecord {
    pub fn subscriptions(&self) -> SubscriptionSet {
        SubscriptionSet::parse(&self.events)
    }

    pub fn is_paired(&self) -> bool {
        !self.jid.is_empty()
    }

    pub fn known_jid(&self) -> Option<&str> {
        (!self.jid.is_empty()).then_some(self.jid.as_str())
    }
}
