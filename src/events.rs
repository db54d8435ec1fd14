//! Typed gateway events.
//!
//! The gateway module deserialises dispatch payloads into this enum so the
//! bot can pattern-match on strongly-typed data instead of raw
//! `(op, t, serde_json::Value)` tuples.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// We've successfully identified / resumed; the bot is ready.
    Ready(ReadyEvent),

    /// Full guild object lazily sent after READY.
    GuildCreate(Guild),

    /// A message was created in a channel we can see.
    MessageCreate(Message),

    /// A message was deleted.
    MessageDelete(MessageDelete),

    /// Someone reacted to a message.
    MessageReactionAdd(ReactionAdd),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). The inner bool indicates whether
    /// the session is resumable.
    InvalidSession(bool),

    /// An event we received but don't have a typed variant for.
    Unknown {
        event_name: Option<String>,
        op: u8,
        data: Option<serde_json::Value>,
    },
}

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`] into a typed event.
    ///
    /// This never fails; unrecognised or malformed events become
    /// [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => {
                let resumable = payload
                    .d
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                GatewayEvent::InvalidSession(resumable)
            }
            11 => GatewayEvent::HeartbeatAck,
            _ => GatewayEvent::Unknown {
                event_name: payload.t,
                op: payload.op,
                data: payload.d,
            },
        }
    }

    /// The dispatch name for op-0 events, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            GatewayEvent::Ready(_) => Some("READY"),
            GatewayEvent::GuildCreate(_) => Some("GUILD_CREATE"),
            GatewayEvent::MessageCreate(_) => Some("MESSAGE_CREATE"),
            GatewayEvent::MessageDelete(_) => Some("MESSAGE_DELETE"),
            GatewayEvent::MessageReactionAdd(_) => Some("MESSAGE_REACTION_ADD"),
            GatewayEvent::Unknown { event_name, .. } => event_name.as_deref(),
            _ => None,
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let (Some(name), Some(d)) = (event_name.as_deref(), data.as_ref()) else {
            return GatewayEvent::Unknown {
                event_name,
                op: 0,
                data,
            };
        };

        let parsed = match name {
            "READY" => typed(name, d, GatewayEvent::Ready),
            "GUILD_CREATE" => typed(name, d, GatewayEvent::GuildCreate),
            "MESSAGE_CREATE" => typed(name, d, GatewayEvent::MessageCreate),
            "MESSAGE_DELETE" => typed(name, d, GatewayEvent::MessageDelete),
            "MESSAGE_REACTION_ADD" => typed(name, d, GatewayEvent::MessageReactionAdd),
            _ => None,
        };

        parsed.unwrap_or(GatewayEvent::Unknown {
            event_name,
            op: 0,
            data,
        })
    }
}

/// Deserialise `d` as `T` and wrap it, logging (not failing) on a bad payload.
fn typed<T: DeserializeOwned>(
    name: &str,
    d: &serde_json::Value,
    wrap: fn(T) -> GatewayEvent,
) -> Option<GatewayEvent> {
    match serde_json::from_value::<T>(d.clone()) {
        Ok(value) => Some(wrap(value)),
        Err(e) => {
            warn!(event = name, error = %e, "failed to parse dispatch payload");
            None
        }
    }
}
