//! Error types for the protocol layer.
//!
//! Each crate in Lobbyforge defines its own error enum, so a
//! `ProtocolError` always means "a message could not be turned into bytes
//! or back", never a storage or room-rule problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, an unknown
    /// event tag, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but makes no sense (e.g. a reply to an event
    /// that was never sent).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
