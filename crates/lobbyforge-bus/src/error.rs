use lobbyforge_protocol::ProtocolError;

/// Errors that can occur on the event bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// An event was addressed to a server that is not on the bus.
    #[error("no server named {0} on the bus")]
    UnknownServer(String),

    /// A second endpoint tried to join under a name already in use.
    #[error("server {0} is already connected to the bus")]
    DuplicateServer(String),

    /// The receiving side went away before the message was handed over.
    #[error("bus endpoint closed: {0}")]
    Closed(String),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
