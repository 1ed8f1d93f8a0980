//! In-process event bus: every endpoint is one "server".
//!
//! Envelopes are encoded to bytes on the way in and decoded on the way
//! out, so handlers see exactly what they would see behind a real broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use lobbyforge_protocol::{
    BusEvent, Codec, Envelope, EventReply, JsonCodec, Reply,
};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::{BusError, EventBus};

/// Settings for a [`LocalBus`].
#[derive(Debug, Clone)]
pub struct LocalBusConfig {
    /// How long `call` waits for each server's reply.
    pub call_timeout: Duration,
}

impl Default for LocalBusConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// One encoded message on its way to an endpoint.
struct Frame {
    bytes: Vec<u8>,
    reply: Option<oneshot::Sender<Vec<u8>>>,
}

/// The shared hub that endpoints connect to.
///
/// Cheap to clone; clones are the same bus.
#[derive(Clone, Default)]
pub struct LocalBus {
    peers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Frame>>>>,
    config: LocalBusConfig,
}

impl LocalBus {
    /// Creates an empty bus with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bus with the given settings.
    pub fn with_config(config: LocalBusConfig) -> Self {
        Self {
            peers: Arc::default(),
            config,
        }
    }

    /// Joins the bus as `server_name`.
    ///
    /// Returns the sending half (implements [`EventBus`]) and the inbox
    /// the server must drain to answer calls and handle published events.
    ///
    /// # Errors
    /// [`BusError::DuplicateServer`] if the name is already taken.
    pub async fn connect(
        &self,
        server_name: impl Into<String>,
    ) -> Result<(LocalEndpoint, Inbox), BusError> {
        let server_name = server_name.into();
        let mut peers = self.peers.write().await;
        if peers.contains_key(&server_name) {
            return Err(BusError::DuplicateServer(server_name));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(server_name.clone(), tx);
        tracing::info!(server = %server_name, "joined local bus");

        let endpoint = LocalEndpoint {
            server_name: server_name.clone(),
            bus: self.clone(),
        };
        let inbox = Inbox { server_name, rx };
        Ok((endpoint, inbox))
    }

    /// Removes a server from the bus. Its inbox stops receiving.
    pub async fn disconnect(&self, server_name: &str) {
        if self.peers.write().await.remove(server_name).is_some() {
            tracing::info!(server = %server_name, "left local bus");
        }
    }

    /// Names of every connected server, sorted.
    pub async fn servers(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.peers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the senders an envelope should reach.
    async fn recipients(
        &self,
        target: Option<&str>,
    ) -> Result<Vec<(String, mpsc::UnboundedSender<Frame>)>, BusError> {
        let peers = self.peers.read().await;
        match target {
            Some(name) => peers
                .get(name)
                .map(|tx| vec![(name.to_string(), tx.clone())])
                .ok_or_else(|| BusError::UnknownServer(name.to_string())),
            None => Ok(peers
                .iter()
                .map(|(name, tx)| (name.clone(), tx.clone()))
                .collect()),
        }
    }
}

/// A server's sending handle on a [`LocalBus`].
#[derive(Clone)]
pub struct LocalEndpoint {
    server_name: String,
    bus: LocalBus,
}

impl LocalEndpoint {
    fn envelope(&self, target: Option<&str>, event: BusEvent) -> Envelope {
        Envelope {
            source: self.server_name.clone(),
            target: target.map(str::to_string),
            event,
        }
    }
}

impl EventBus for LocalEndpoint {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn call(
        &self,
        target: Option<&str>,
        event: BusEvent,
    ) -> Result<Vec<Reply>, BusError> {
        let name = event.name();
        let bytes = JsonCodec.encode(&self.envelope(target, event))?;
        let recipients = self.bus.recipients(target).await?;

        let mut pending = Vec::with_capacity(recipients.len());
        for (server, tx) in recipients {
            let (reply_tx, reply_rx) = oneshot::channel();
            let frame = Frame {
                bytes: bytes.clone(),
                reply: Some(reply_tx),
            };
            if tx.send(frame).is_err() {
                tracing::debug!(%server, event = name, "inbox closed, skipping");
                continue;
            }
            pending.push((server, reply_rx));
        }

        let timeout = self.bus.config.call_timeout;
        let answers = join_all(pending.into_iter().map(
            |(server, rx)| async move {
                (server, tokio::time::timeout(timeout, rx).await)
            },
        ))
        .await;

        let mut replies = Vec::with_capacity(answers.len());
        for (server, answer) in answers {
            match answer {
                Ok(Ok(bytes)) => match JsonCodec.decode::<Reply>(&bytes) {
                    Ok(reply) => replies.push(reply),
                    Err(e) => {
                        tracing::warn!(%server, error = %e, "undecodable reply");
                    }
                },
                // The handler dropped the reply handle: it chose not to answer.
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!(%server, event = name, "call timed out");
                }
            }
        }
        Ok(replies)
    }

    async fn publish(
        &self,
        target: Option<&str>,
        event: BusEvent,
    ) -> Result<(), BusError> {
        let name = event.name();
        let bytes = JsonCodec.encode(&self.envelope(target, event))?;
        let recipients = self.bus.recipients(target).await?;

        for (server, tx) in recipients {
            let frame = Frame {
                bytes: bytes.clone(),
                reply: None,
            };
            if tx.send(frame).is_err() {
                if target.is_some() {
                    return Err(BusError::Closed(server));
                }
                tracing::debug!(%server, event = name, "inbox closed, skipping");
            }
        }
        Ok(())
    }
}

/// A message delivered to a server's inbox.
pub struct Delivery {
    pub envelope: Envelope,
    /// Present when the sender used `call` and is waiting for an answer.
    pub reply: Option<ReplyHandle>,
}

/// Answers one `call`. Dropping it without sending tells the caller this
/// server has nothing to say.
pub struct ReplyHandle {
    server_name: String,
    tx: oneshot::Sender<Vec<u8>>,
}

impl ReplyHandle {
    /// Sends the answer back to the caller.
    ///
    /// # Errors
    /// [`BusError::Closed`] if the caller stopped waiting.
    pub fn send(self, reply: EventReply) -> Result<(), BusError> {
        let reply = Reply {
            server: self.server_name.clone(),
            reply,
        };
        let bytes = JsonCodec.encode(&reply)?;
        self.tx
            .send(bytes)
            .map_err(|_| BusError::Closed(self.server_name))
    }
}

/// The receiving side of a server's bus connection.
pub struct Inbox {
    server_name: String,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Inbox {
    /// The server this inbox belongs to.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Waits for the next decodable message.
    ///
    /// Returns `None` once the server has been disconnected from the bus.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let frame = self.rx.recv().await?;
            match JsonCodec.decode::<Envelope>(&frame.bytes) {
                Ok(envelope) => {
                    let reply = frame.reply.map(|tx| ReplyHandle {
                        server_name: self.server_name.clone(),
                        tx,
                    });
                    return Some(Delivery { envelope, reply });
                }
                Err(e) => {
                    tracing::warn!(
                        server = %self.server_name,
                        error = %e,
                        "dropping undecodable envelope"
                    );
                }
            }
        }
    }
}
