//! Relay wire protocol
//!
//! Client → relay: `["REQ", id, filter]`, `["CLOSE", id]`
//! Relay → client: `["EVENT", id, event]`, `["EOSE", id]`, `["CLOSED", id, reason]`, `["NOTICE", msg]`

use serde_json::{json, Value};
use wot_core::{Event, Filter};

use crate::RelayError;

/// Messages sent to a relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req { sub_id: String, filter: Filter },
    Close { sub_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Req { sub_id, filter } => json!(["REQ", sub_id, filter]).to_string(),
            ClientMessage::Close { sub_id } => json!(["CLOSE", sub_id]).to_string(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        let parts = parse_array(text)?;
        match label(&parts)? {
            "REQ" if parts.len() >= 3 => Ok(ClientMessage::Req {
                sub_id: string_at(&parts, 1)?,
                filter: serde_json::from_value(parts[2].clone())
                    .map_err(|e| RelayError::Malformed(e.to_string()))?,
            }),
            "CLOSE" => Ok(ClientMessage::Close {
                sub_id: string_at(&parts, 1)?,
            }),
            other => Err(RelayError::Malformed(format!("unexpected client frame {}", other))),
        }
    }
}

/// Messages received from a relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Eose { sub_id: String },
    Closed { sub_id: String, reason: String },
    Notice(String),
}

impl RelayMessage {
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        let parts = parse_array(text)?;
        match label(&parts)? {
            "EVENT" if parts.len() >= 3 => {
                let event: Event = serde_json::from_value(parts[2].clone())
                    .map_err(|e| RelayError::Malformed(format!("event: {}", e)))?;
                Ok(RelayMessage::Event {
                    sub_id: string_at(&parts, 1)?,
                    event,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                sub_id: string_at(&parts, 1)?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                sub_id: string_at(&parts, 1)?,
                reason: string_at(&parts, 2).unwrap_or_default(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice(string_at(&parts, 1).unwrap_or_default())),
            other => Err(RelayError::Malformed(format!("unexpected relay frame {}", other))),
        }
    }

    pub fn to_json(&self) -> String {
        match self {
            RelayMessage::Event { sub_id, event } => json!(["EVENT", sub_id, event]).to_string(),
            RelayMessage::Eose { sub_id } => json!(["EOSE", sub_id]).to_string(),
            RelayMessage::Closed { sub_id, reason } => json!(["CLOSED", sub_id, reason]).to_string(),
            RelayMessage::Notice(msg) => json!(["NOTICE", msg]).to_string(),
        }
    }

    /// Subscription this message belongs to, if any
    pub fn sub_id(&self) -> Option<&str> {
        match self {
            RelayMessage::Event { sub_id, .. }
            | RelayMessage::Eose { sub_id }
            | RelayMessage::Closed { sub_id, .. } => Some(sub_id),
            RelayMessage::Notice(_) => None,
        }
    }
}

/// Fresh subscription id
pub fn new_subscription_id() -> String {
    format!("wot-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

fn parse_array(text: &str) -> Result<Vec<Value>, RelayError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(parts)) if !parts.is_empty() => Ok(parts),
        Ok(_) => Err(RelayError::Malformed("expected a non-empty array".to_string())),
        Err(e) => Err(RelayError::Malformed(e.to_string())),
    }
}

fn label(parts: &[Value]) -> Result<&str, RelayError> {
    parts[0]
        .as_str()
        .ok_or_else(|| RelayError::Malformed("missing frame label".to_string()))
}

fn string_at(parts: &[Value], idx: usize) -> Result<String, RelayError> {
    parts
        .get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::Malformed(format!("missing string at {}", idx)))
}
