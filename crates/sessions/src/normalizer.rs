//! Classification of protocol events into dispatch-ready envelopes.
//!
//! [`normalize`] is pure: it decides what an event means for the tenant and
//! returns the side effects the worker must carry out, but performs none of
//! them itself.

use {
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, info},
    wagate_channels::{MediaRef, ProtocolEvent, ReceiptKind},
    wagate_common::{Envelope, EventKind},
};

/// App state patch name after which presence is announced.
pub const CRITICAL_BLOCK: &str = "critical_block";

/// Session-level consequences of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Transport is up again after a drop.
    Connected,
    Reconnecting,
    PushName(String),
    /// Announce the account as available, if a push name is known.
    AnnouncePresence,
    /// A new protocol identity was assigned.
    PersistJid(String),
    LoggedOut,
}

/// What to do with the event itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Dispatch(Envelope),
    /// Fetch and store the media first; skip the event if that fails.
    WithMedia {
        envelope: Envelope,
        event_id: String,
        media: MediaRef,
    },
    /// Write the bulk payload to disk and dispatch only a reference to it.
    WithHistory { envelope: Envelope, data: Value },
    Drop(&'static str),
}

impl Disposition {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::Dispatch(env) | Self::WithMedia { envelope: env, .. } => Some(env.kind),
            Self::WithHistory { envelope, .. } => Some(envelope.kind),
            Self::Drop(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub disposition: Disposition,
    pub effects: Vec<Effect>,
}

impl Normalized {
    fn dispatch(envelope: Envelope) -> Self {
        Self {
            disposition: Disposition::Dispatch(envelope),
            effects: Vec::new(),
        }
    }

    fn discard(reason: &'static str) -> Self {
        Self {
            disposition: Disposition::Drop(reason),
            effects: Vec::new(),
        }
    }

    fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

fn payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn push_name_effects(push_name: String) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(2);
    if !push_name.is_empty() {
        effects.push(Effect::PushName(push_name));
    }
    effects.push(Effect::AnnouncePresence);
    effects
}

pub fn normalize(event: ProtocolEvent) -> Normalized {
    match event {
        ProtocolEvent::Connected { push_name } => {
            let env = Envelope::new(EventKind::SessionStatus, json!({ "pushName": push_name }))
                .with_state("Connected");
            let mut effects = vec![Effect::Connected];
            effects.extend(push_name_effects(push_name));
            Normalized::dispatch(env).with_effects(effects)
        },
        ProtocolEvent::PushNameSetting { push_name } => {
            let env = Envelope::new(EventKind::SessionStatus, json!({ "pushName": push_name }))
                .with_state("Connected");
            Normalized::dispatch(env).with_effects(push_name_effects(push_name))
        },
        ProtocolEvent::Disconnected => {
            Normalized::discard("transport dropped").with_effects([Effect::Reconnecting])
        },
        ProtocolEvent::PairSuccess(pair) => {
            info!(jid = %pair.id, business_name = %pair.business_name, platform = %pair.platform, "pair success");
            let env = Envelope::new(EventKind::PairSuccess, payload(&pair));
            let effects = (!pair.id.is_empty()).then(|| Effect::PersistJid(pair.id.clone()));
            Normalized::dispatch(env).with_effects(effects)
        },
        ProtocolEvent::PairError(pair) => {
            info!(jid = %pair.id, error = ?pair.error, "pair error");
            Normalized::dispatch(Envelope::new(EventKind::PairError, payload(&pair)))
        },
        // Codes reach the webhook through the pairing flow, which also
        // renders and persists them.
        ProtocolEvent::Qr { .. } => Normalized::discard("pairing code handled by pairing flow"),
        ProtocolEvent::LoggedOut { on_connect, reason } => {
            info!(reason = %reason, on_connect, "logged out");
            let env = Envelope::new(
                EventKind::SessionStatus,
                json!({ "onConnect": on_connect, "reason": reason }),
            )
            .with_state("LoggedOut");
            Normalized::dispatch(env).with_effects([Effect::LoggedOut])
        },
        ProtocolEvent::StreamReplaced => {
            info!("stream replaced");
            Normalized::discard("stream replaced")
        },
        ProtocolEvent::Message(msg) => {
            debug!(id = %msg.info.id, chat = %msg.info.chat, sender = %msg.info.sender, "message received");
            let env = Envelope::new(EventKind::Message, payload(&msg));
            match msg.media {
                Some(media) if media.kind.is_downloaded() && !msg.info.id.is_empty() => {
                    Normalized {
                        disposition: Disposition::WithMedia {
                            envelope: env,
                            event_id: msg.info.id,
                            media,
                        },
                        effects: Vec::new(),
                    }
                },
                _ => Normalized::dispatch(env),
            }
        },
        ProtocolEvent::Receipt(receipt) => {
            let state = match receipt.kind {
                ReceiptKind::Read => "Read",
                ReceiptKind::ReadSelf => "ReadSelf",
                ReceiptKind::Delivered => "Delivered",
                _ => return Normalized::discard("receipt kind not forwarded"),
            };
            debug!(ids = ?receipt.message_ids, state, "receipt");
            Normalized::dispatch(
                Envelope::new(EventKind::ReadReceipt, payload(&receipt)).with_state(state),
            )
        },
        ProtocolEvent::Presence(presence) => {
            let state = if presence.unavailable {
                "offline"
            } else {
                "online"
            };
            debug!(from = %presence.from, state, "presence");
            Normalized::dispatch(
                Envelope::new(EventKind::Presence, payload(&presence)).with_state(state),
            )
        },
        ProtocolEvent::ChatPresence(chat) => {
            debug!(chat = %chat.chat, state = %chat.state, media = %chat.media, "chat presence");
            Normalized::dispatch(Envelope::new(EventKind::ChatPresence, payload(&chat)))
        },
        ProtocolEvent::HistorySync { data } => Normalized {
            disposition: Disposition::WithHistory {
                envelope: Envelope::new(EventKind::HistorySync, json!({})),
                data,
            },
            effects: Vec::new(),
        },
        ProtocolEvent::AppStateSyncComplete { name, push_name } => {
            let effects = if name == CRITICAL_BLOCK && !push_name.is_empty() {
                push_name_effects(push_name)
            } else {
                Vec::new()
            };
            Normalized::discard("app state sync").with_effects(effects)
        },
        ProtocolEvent::AppState { index } => {
            debug!(index = ?index, "app state event");
            Normalized::discard("app state")
        },
        ProtocolEvent::CallOffer(call)
        | ProtocolEvent::CallAccept(call)
        | ProtocolEvent::CallTerminate(call)
        | ProtocolEvent::CallOfferNotice(call)
        | ProtocolEvent::CallRelayLatency(call) => {
            info!(from = %call.from, call_id = %call.call_id, "call event");
            Normalized::discard("call events are not forwarded")
        },
        ProtocolEvent::Unknown { kind, .. } => {
            info!(kind = %kind, "unhandled event");
            Normalized::discard("unhandled event")
        },
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        wagate_channels::{
            ChatPresenceEvent, MediaKind, MessageEvent, MessageInfo, PairEvent, PresenceEvent,
            ReceiptEvent,
        },
    };

    fn message(id: &str, media: Option<MediaRef>) -> ProtocolEvent {
        ProtocolEvent::Message(MessageEvent {
            info: MessageInfo {
                id: id.into(),
                chat: "1@s.whatsapp.net".into(),
                sender: "1@s.whatsapp.net".into(),
                is_from_me: false,
                is_group: false,
                push_name: "Ann".into(),
                timestamp: 1,
            },
            text: Some("hi".into()),
            media,
            message: Value::Null,
        })
    }

    fn media(kind: MediaKind) -> MediaRef {
        MediaRef {
            kind,
            mime_type: "image/jpeg".into(),
            file_name: None,
            caption: None,
            handle: Value::Null,
        }
    }

    fn receipt(kind: ReceiptKind) -> ProtocolEvent {
        ProtocolEvent::Receipt(ReceiptEvent {
            kind,
            message_ids: vec!["m1".into()],
            chat: String::new(),
            sender: String::new(),
            timestamp: 0,
        })
    }

    #[test]
    fn connected_is_session_status() {
        let n = normalize(ProtocolEvent::Connected {
            push_name: "Ann".into(),
        });
        let Disposition::Dispatch(env) = &n.disposition else {
            panic!("expected dispatch");
        };
        assert_eq!(env.kind, EventKind::SessionStatus);
        assert_eq!(env.state.as_deref(), Some("Connected"));
        assert_eq!(n.effects, vec![
            Effect::Connected,
            Effect::PushName("Ann".into()),
            Effect::AnnouncePresence,
        ]);
    }

    #[test]
    fn logged_out_dispatches_then_stops() {
        let n = normalize(ProtocolEvent::LoggedOut {
            on_connect: false,
            reason: "unpaired".into(),
        });
        assert_eq!(n.disposition.kind(), Some(EventKind::SessionStatus));
        let Disposition::Dispatch(env) = &n.disposition else {
            panic!("expected dispatch");
        };
        assert_eq!(env.state.as_deref(), Some("LoggedOut"));
        assert_eq!(n.effects, vec![Effect::LoggedOut]);
    }

    #[test]
    fn receipts_forward_only_read_and_delivered() {
        for (kind, state) in [
            (ReceiptKind::Read, "Read"),
            (ReceiptKind::ReadSelf, "ReadSelf"),
            (ReceiptKind::Delivered, "Delivered"),
        ] {
            let Disposition::Dispatch(env) = normalize(receipt(kind)).disposition else {
                panic!("expected dispatch for {kind:?}");
            };
            assert_eq!(env.kind, EventKind::ReadReceipt);
            assert_eq!(env.state.as_deref(), Some(state));
        }
        for kind in [ReceiptKind::Played, ReceiptKind::Inactive, ReceiptKind::Other] {
            assert_eq!(normalize(receipt(kind)).disposition.kind(), None);
        }
    }

    #[test]
    fn presence_states() {
        let online = normalize(ProtocolEvent::Presence(PresenceEvent {
            from: "1@s".into(),
            unavailable: false,
            last_seen: None,
        }));
        let offline = normalize(ProtocolEvent::Presence(PresenceEvent {
            from: "1@s".into(),
            unavailable: true,
            last_seen: Some(10),
        }));
        let state = |n: Normalized| match n.disposition {
            Disposition::Dispatch(env) => env.state,
            _ => None,
        };
        assert_eq!(state(online).as_deref(), Some("online"));
        assert_eq!(state(offline).as_deref(), Some("offline"));
    }

    #[test]
    fn media_messages_need_download() {
        match normalize(message("ABC", Some(media(MediaKind::Image)))).disposition {
            Disposition::WithMedia {
                envelope, event_id, ..
            } => {
                assert_eq!(envelope.kind, EventKind::Message);
                assert_eq!(event_id, "ABC");
                assert_eq!(envelope.payload["info"]["id"], "ABC");
            },
            other => panic!("expected media disposition, got {other:?}"),
        }
        // Stickers and plain text go straight out.
        assert!(matches!(
            normalize(message("S1", Some(media(MediaKind::Sticker)))).disposition,
            Disposition::Dispatch(_)
        ));
        assert!(matches!(
            normalize(message("T1", None)).disposition,
            Disposition::Dispatch(_)
        ));
    }

    #[test]
    fn history_sync_is_not_inlined() {
        let n = normalize(ProtocolEvent::HistorySync {
            data: json!({"conversations": [1, 2, 3]}),
        });
        match n.disposition {
            Disposition::WithHistory { envelope, data } => {
                assert_eq!(envelope.kind, EventKind::HistorySync);
                assert_eq!(envelope.payload, json!({}));
                assert_eq!(data["conversations"][2], 3);
            },
            other => panic!("expected history disposition, got {other:?}"),
        }
    }

    #[test]
    fn pair_success_persists_identity() {
        let n = normalize(ProtocolEvent::PairSuccess(PairEvent {
            id: "555@s.whatsapp.net".into(),
            business_name: String::new(),
            platform: "android".into(),
            error: None,
        }));
        assert_eq!(n.disposition.kind(), Some(EventKind::PairSuccess));
        assert_eq!(n.effects, vec![Effect::PersistJid("555@s.whatsapp.net".into())]);
    }

    #[test]
    fn critical_app_state_announces_presence_only() {
        let n = normalize(ProtocolEvent::AppStateSyncComplete {
            name: CRITICAL_BLOCK.into(),
            push_name: "Ann".into(),
        });
        assert_eq!(n.disposition.kind(), None);
        assert_eq!(n.effects, vec![
            Effect::PushName("Ann".into()),
            Effect::AnnouncePresence
        ]);

        let other = normalize(ProtocolEvent::AppStateSyncComplete {
            name: "regular".into(),
            push_name: "Ann".into(),
        });
        assert!(other.effects.is_empty());
    }

    #[test]
    fn undefined_events_are_dropped() {
        for ev in [
            ProtocolEvent::StreamReplaced,
            ProtocolEvent::Qr {
                codes: vec!["x".into()],
            },
            ProtocolEvent::AppState { index: vec![] },
            ProtocolEvent::Unknown {
                kind: "Blocklist".into(),
                payload: Value::Null,
            },
        ] {
            assert_eq!(normalize(ev).disposition.kind(), None);
        }
    }

    #[test]
    fn chat_presence_is_forwarded() {
        let n = normalize(ProtocolEvent::ChatPresence(ChatPresenceEvent {
            chat: "1@s".into(),
            sender: "1@s".into(),
            state: "composing".into(),
            media: String::new(),
        }));
        assert_eq!(n.disposition.kind(), Some(EventKind::ChatPresence));
    }
}
