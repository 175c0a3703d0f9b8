//! Bridge wire frames.

use {
    serde::Deserialize,
    serde_json::{Map, Value, json},
    wagate_channels::PairingSignal,
};

/// Error string the bridge returns from `pair` on an already paired device.
pub const ALREADY_PAIRED: &str = "already_paired";

/// Anything the bridge sends us.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Response {
        id: u64,
        result: Result<Value, String>,
    },
    Event(Value),
    Pairing(PairingSignal),
}

#[derive(Deserialize)]
struct RawPairing {
    event: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    jid: Option<String>,
}

/// Build a request frame; `args` (an object) is merged into the top level.
pub fn request(id: u64, cmd: &str, args: Value) -> Value {
    let mut frame = Map::new();
    frame.insert("id".into(), json!(id));
    frame.insert("cmd".into(), json!(cmd));
    if let Value::Object(extra) = args {
        for (k, v) in extra {
            frame.entry(k).or_insert(v);
        }
    }
    Value::Object(frame)
}

/// Classify one text frame. `None` for frames that are not JSON or match
/// no known shape.
pub fn parse(text: &str) -> Option<Inbound> {
    let mut value: Value = serde_json::from_str(text).ok()?;
    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let result = if ok {
            Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
        } else {
            Err(value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string())
        };
        return Some(Inbound::Response { id, result });
    }
    if let Some(event) = value.get_mut("event").map(Value::take) {
        return Some(Inbound::Event(event));
    }
    let pairing = value.get_mut("pairing").map(Value::take)?;
    let raw: RawPairing = serde_json::from_value(pairing).ok()?;
    let signal = match raw.event.as_str() {
        "code" => match raw.code {
            Some(code) if !code.is_empty() => PairingSignal::Code(code),
            _ => PairingSignal::Other("code".into()),
        },
        "timeout" => PairingSignal::Timeout,
        "success" => PairingSignal::Success { jid: raw.jid },
        other => PairingSignal::Other(other.to_string()),
    };
    Some(Inbound::Pairing(signal))
}
