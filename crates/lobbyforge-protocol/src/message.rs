//! Messages that travel between game servers over the event bus.
//!
//! Every message is an [`Envelope`]: who sent it, which server it is meant
//! for (or `None` for everyone), and the typed [`BusEvent`] inside. A
//! request/response call gets back one [`Reply`] per server that answered.
//!
//! `#[serde(tag = "type")]` gives "internally tagged" JSON:
//!   `{ "type": "WhereIs", "user": "..." }`
//! which keeps the bus traffic readable when it is logged.

use serde::{Deserialize, Serialize};

use crate::{Location, UserId};

/// The top-level bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The server that sent the message.
    pub source: String,
    /// Only this server should handle it. `None` means every server.
    pub target: Option<String>,
    /// The payload.
    pub event: BusEvent,
}

impl Envelope {
    /// Returns `true` if a server with this name should handle the envelope.
    pub fn is_for(&self, server_name: &str) -> bool {
        match &self.target {
            None => true,
            Some(target) => target == server_name,
        }
    }
}

/// The events game servers exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    // -- Queries (sent with `call`) --
    /// "Is this user connected to you?"
    WhereIs { user: UserId },

    /// "Which users are connected to you?"
    GetOnlinePlayers,

    // -- Commands (sent with `publish`) --
    /// "Move this user to this location." Addressed either to the server
    /// that hosts the user or to the destination server.
    Teleport { user: UserId, location: Location },

    /// "Show this text to this user if they are on your server."
    UserMessage { user: UserId, message: String },

    /// "Show this already-formatted chat line to everyone, if you are on
    /// the whitelist."
    ChatRelay {
        message: String,
        server_whitelist: Vec<String>,
    },
}

impl BusEvent {
    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WhereIs { .. } => "WhereIs",
            Self::GetOnlinePlayers => "GetOnlinePlayers",
            Self::Teleport { .. } => "Teleport",
            Self::UserMessage { .. } => "UserMessage",
            Self::ChatRelay { .. } => "ChatRelay",
        }
    }
}

/// What a server answers to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventReply {
    /// Answer to [`BusEvent::WhereIs`].
    Presence { online: bool },
    /// Answer to [`BusEvent::GetOnlinePlayers`].
    OnlinePlayers { users: Vec<UserId> },
    /// The server received the event but has nothing to say about it.
    Ack,
}

/// One server's answer to a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// The server that answered.
    pub server: String,
    pub reply: EventReply,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_target_is_for_everyone() {
        let env = Envelope {
            source: "lobby".into(),
            target: None,
            event: BusEvent::GetOnlinePlayers,
        };
        assert!(env.is_for("lobby"));
        assert!(env.is_for("bw-1"));
    }

    #[test]
    fn test_envelope_with_target_is_only_for_target() {
        let env = Envelope {
            source: "lobby".into(),
            target: Some("bw-1".into()),
            event: BusEvent::GetOnlinePlayers,
        };
        assert!(env.is_for("bw-1"));
        assert!(!env.is_for("lobby"));
    }

    #[test]
    fn test_bus_event_json_is_internally_tagged() {
        let user = UserId(uuid::Uuid::nil());
        let json = serde_json::to_value(BusEvent::WhereIs { user }).unwrap();
        assert_eq!(json["type"], "WhereIs");
        assert_eq!(json["user"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_bus_event_name() {
        let event = BusEvent::ChatRelay {
            message: "hi".into(),
            server_whitelist: vec![],
        };
        assert_eq!(event.name(), "ChatRelay");
    }
}
