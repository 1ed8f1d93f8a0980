//! Event bus abstraction for Lobbyforge.
//!
//! Provides the [`EventBus`] trait that abstracts over whatever messaging
//! system links the game servers (a message broker, a proxy plugin
//! channel, ...), plus [`LocalBus`], an in-process implementation where
//! every connected endpoint plays the part of one server.
//!
//! Two primitives are enough for the coordination core:
//!
//! - **call** — send an event and collect one reply from every server
//!   that handles it ("who has player X online?").
//! - **publish** — fire-and-forget ("move player X", "show this message").

#![allow(async_fn_in_trait)]

mod error;
mod local;

pub use error::BusError;
pub use local::{Delivery, Inbox, LocalBus, LocalBusConfig, LocalEndpoint, ReplyHandle};

use std::future::Future;

use lobbyforge_protocol::{BusEvent, Reply};

/// One server's handle on the cross-server bus.
pub trait EventBus: Send + Sync + 'static {
    /// The name this server is known by on the bus.
    fn server_name(&self) -> &str;

    /// Sends `event` to `target` (or every server when `None`) and waits
    /// for their replies.
    ///
    /// Servers that do not answer within the bus's call timeout are left
    /// out of the result; they do not fail the call.
    fn call(
        &self,
        target: Option<&str>,
        event: BusEvent,
    ) -> impl Future<Output = Result<Vec<Reply>, BusError>> + Send;

    /// Sends `event` to `target` (or every server when `None`) without
    /// waiting for anything.
    fn publish(
        &self,
        target: Option<&str>,
        event: BusEvent,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}
