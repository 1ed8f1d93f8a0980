//! Inbound bus loop: answers queries and carries out commands from other
//! servers.
//!
//! Every delivery is handled in its own task. A handler may itself wait on
//! the bus (a teleport can ask `WhereIs`), and this server's own inbox
//! must keep draining meanwhile or that call would wait on itself.

use lobbyforge_bus::{Delivery, EventBus, Inbox};
use lobbyforge_protocol::{BusEvent, EventReply};
use lobbyforge_session::HostRuntime;
use lobbyforge_store::RecordStore;

use crate::LobbyNode;

impl<S, B, H> LobbyNode<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    /// Serves this server's inbox until it is disconnected from the bus.
    pub async fn run(self, mut inbox: Inbox) {
        tracing::info!(server = %self.server_name(), "lobby node listening");

        while let Some(delivery) = inbox.recv().await {
            let node = self.clone();
            tokio::spawn(async move {
                node.handle_delivery(delivery).await;
            });
        }

        tracing::info!(server = %self.server_name(), "inbox closed, lobby node stopped");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let Delivery { envelope, reply } = delivery;
        let here = self.server_name();
        if !envelope.is_for(here) {
            return;
        }
        let name = envelope.event.name();
        tracing::debug!(source = %envelope.source, event = name, "bus event received");

        let answer = match envelope.event {
            BusEvent::WhereIs { user } => EventReply::Presence {
                online: self.state.teleports.is_online(user).await,
            },
            BusEvent::GetOnlinePlayers => EventReply::OnlinePlayers {
                users: self.state.teleports.online_users().await,
            },
            BusEvent::Teleport { user, location } => {
                if let Err(e) = self
                    .state
                    .teleports
                    .handle_remote_teleport(user, location)
                    .await
                {
                    tracing::error!(%user, source = %envelope.source, error = %e, "teleport failed");
                }
                EventReply::Ack
            }
            BusEvent::UserMessage { user, message } => {
                if self.state.teleports.is_online(user).await {
                    self.state.host.send_message(user, &message).await;
                }
                EventReply::Ack
            }
            BusEvent::ChatRelay {
                message,
                server_whitelist,
            } => {
                if server_whitelist.is_empty() || server_whitelist.iter().any(|s| s == here) {
                    self.state.host.broadcast(&message).await;
                }
                EventReply::Ack
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = reply.send(answer) {
                tracing::debug!(event = name, error = %e, "caller stopped waiting");
            }
        }
    }
}
