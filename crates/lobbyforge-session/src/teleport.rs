//! Teleport hand-off across servers.
//!
//! A teleport request can name any server and may arrive before its user
//! is connected anywhere. The coordinator resolves it in this order:
//!
//! ```text
//! user on this server? ──yes──→ target here?  ──yes──→ apply (Delivered)
//!        │                            └──no───→ queue + transfer (Forwarded)
//!        no
//!        ▼
//! ask the bus WhereIs ──→ target server has them ──→ publish (Delivered)
//!        │            └─→ another server has them ──→ publish (Forwarded)
//!        ▼
//! nobody has them ──→ queue PendingTeleport (Queued)
//! ```
//!
//! A queued teleport is picked up by whichever server the user connects to
//! next ([`TeleportCoordinator::establish_session`]).
//!
//! # Race with connecting users
//!
//! The presence check and the queue write happen under the same lock that
//! [`TeleportCoordinator::establish_session`] takes to mark a user online
//! and take their pending entry. So either the teleport sees the user as
//! online, or the session sees the queued teleport. It cannot miss both.
//!
//! The host runtime is only called after that lock is released, so a slow
//! host never stalls `WhereIs` answers for other servers.

use std::sync::Arc;

use lobbyforge_bus::EventBus;
use lobbyforge_protocol::{
    BusEvent, Clock, EventReply, Location, PendingTeleport, UserId,
};
use lobbyforge_store::RecordStore;
use tokio::sync::Mutex;

use crate::{HostRuntime, PresenceTracker, SessionError, TeleportConfig};

/// How many times a pending entry is re-read when another server keeps
/// rewriting it.
const PENDING_ATTEMPTS: u32 = 5;

/// What happened to a teleport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportOutcome {
    /// The user is already on the target server and no position was asked
    /// for.
    AlreadyThere,
    /// The server hosting the user placed them (or was told to).
    Delivered,
    /// The user is on another server and is being sent on; the target
    /// server finishes the job.
    Forwarded,
    /// Nobody has the user right now; they will be moved when they show up.
    Queued,
    /// This server had to move the user and the host refused (for example
    /// an unknown world). The failure is logged here and not retried.
    Failed,
}

/// Host work for a user connected here, decided under the presence lock
/// and carried out after it is released.
enum LocalStep {
    Stay,
    Place,
    Transfer(String),
}

/// Moves users to locations on any server, now or when they connect.
pub struct TeleportCoordinator<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    store: Arc<S>,
    bus: Arc<B>,
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    config: TeleportConfig,
    presence: Mutex<PresenceTracker>,
}

impl<S, B, H> TeleportCoordinator<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        host: Arc<H>,
        clock: Arc<dyn Clock>,
        config: TeleportConfig,
    ) -> Self {
        Self {
            store,
            bus,
            host,
            clock,
            config,
            presence: Mutex::new(PresenceTracker::new()),
        }
    }

    /// This server's name on the bus.
    pub fn server_name(&self) -> &str {
        self.bus.server_name()
    }

    /// Moves `user` to `location`, wherever the user currently is.
    ///
    /// A host refusal on this server is logged and reported as
    /// [`TeleportOutcome::Failed`]; the caller never sees it as an error.
    ///
    /// # Errors
    /// - [`SessionError::Bus`] if the bus could not be asked or told
    /// - [`SessionError::Store`] if a pending entry could not be written
    pub async fn teleport(
        &self,
        user: UserId,
        location: Location,
    ) -> Result<TeleportOutcome, SessionError> {
        let step = {
            let presence = self.presence.lock().await;
            if presence.is_online(&user) {
                Some(self.plan_local(user, &location).await?)
            } else {
                None
            }
        };
        if let Some(step) = step {
            return Ok(self.run_local(user, location, step).await);
        }

        let here = self.server_name().to_string();
        let replies = self
            .bus
            .call(None, BusEvent::WhereIs { user })
            .await?;
        let hosts: Vec<String> = replies
            .into_iter()
            .filter(|r| r.server != here)
            .filter(|r| r.reply == EventReply::Presence { online: true })
            .map(|r| r.server)
            .collect();

        if let Some(target) = hosts.iter().find(|server| location.is_on(server)) {
            if location.is_server_only() {
                tracing::debug!(%user, %location, "user already on target server");
                return Ok(TeleportOutcome::AlreadyThere);
            }
            let target = target.clone();
            self.bus
                .publish(Some(&target), BusEvent::Teleport { user, location })
                .await?;
            tracing::info!(%user, server = %target, "teleport sent to hosting server");
            return Ok(TeleportOutcome::Delivered);
        }

        if let Some(current) = hosts.first() {
            tracing::info!(%user, via = %current, %location, "teleport forwarded to hosting server");
            self.bus
                .publish(Some(current), BusEvent::Teleport { user, location })
                .await?;
            return Ok(TeleportOutcome::Forwarded);
        }

        // Nobody answered for the user. They may have connected here while
        // we were asking.
        let step = {
            let presence = self.presence.lock().await;
            if !presence.is_online(&user) {
                self.queue(user, location).await?;
                return Ok(TeleportOutcome::Queued);
            }
            self.plan_local(user, &location).await?
        };
        Ok(self.run_local(user, location, step).await)
    }

    /// Handles a `Teleport` event another server addressed to this one.
    ///
    /// Never goes back to the bus: if the user is not here (any more) the
    /// request is queued for their next connection.
    pub async fn handle_remote_teleport(
        &self,
        user: UserId,
        location: Location,
    ) -> Result<TeleportOutcome, SessionError> {
        let step = {
            let presence = self.presence.lock().await;
            if !presence.is_online(&user) {
                tracing::debug!(%user, %location, "teleport for absent user, queueing");
                self.queue(user, location).await?;
                return Ok(TeleportOutcome::Queued);
            }
            self.plan_local(user, &location).await?
        };
        Ok(self.run_local(user, location, step).await)
    }

    /// Marks the user as connected here and takes their pending teleport,
    /// if one is waiting.
    ///
    /// The caller should hand the returned location to
    /// [`teleport`](Self::teleport), which now finds the user online.
    pub async fn establish_session(
        &self,
        user: UserId,
    ) -> Result<Option<Location>, SessionError> {
        let mut presence = self.presence.lock().await;
        presence.connect(user)?;
        self.resolve_pending(user).await
    }

    /// Takes the user's pending teleport out of the store.
    ///
    /// At most one caller across all servers gets a given entry. Expired
    /// entries are deleted and reported as `None`.
    pub async fn resolve_pending(
        &self,
        user: UserId,
    ) -> Result<Option<Location>, SessionError> {
        for _ in 0..PENDING_ATTEMPTS {
            let Some(pending) = self.store.get::<PendingTeleport>(&user.key()).await? else {
                return Ok(None);
            };

            match self.store.delete(&pending).await {
                Ok(()) => {}
                // Rewritten or taken since we read it: look again.
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }

            if pending.is_expired(self.clock.now_ms()) {
                tracing::debug!(%user, location = %pending.location, "expired pending teleport dropped");
                return Ok(None);
            }
            tracing::info!(%user, location = %pending.location, "pending teleport resolved");
            return Ok(Some(pending.location));
        }
        Err(SessionError::Contended(user))
    }

    /// Marks the user as gone from this server.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the user was not connected here.
    pub async fn end_session(&self, user: UserId) -> Result<(), SessionError> {
        self.presence.lock().await.disconnect(user)
    }

    /// Returns `true` if the user is connected to this server.
    pub async fn is_online(&self, user: UserId) -> bool {
        self.presence.lock().await.is_online(&user)
    }

    /// Everyone connected to this server, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.presence.lock().await.online_users()
    }

    // -- Internals --

    /// The user is connected here; the caller holds the presence lock.
    ///
    /// A move to another server writes the pending entry now, so the
    /// target server finds it however soon the user arrives.
    async fn plan_local(
        &self,
        user: UserId,
        location: &Location,
    ) -> Result<LocalStep, SessionError> {
        if location.is_on(self.server_name()) {
            if location.is_server_only() {
                return Ok(LocalStep::Stay);
            }
            return Ok(LocalStep::Place);
        }
        self.queue(user, location.clone()).await?;
        Ok(LocalStep::Transfer(location.server_name.clone()))
    }

    /// Calls the host for a step decided by [`plan_local`](Self::plan_local).
    async fn run_local(
        &self,
        user: UserId,
        location: Location,
        step: LocalStep,
    ) -> TeleportOutcome {
        match step {
            LocalStep::Stay => TeleportOutcome::AlreadyThere,
            LocalStep::Place => match self.host.apply_teleport(user, &location).await {
                Ok(()) => {
                    tracing::info!(%user, %location, "user teleported");
                    TeleportOutcome::Delivered
                }
                Err(e) => {
                    tracing::error!(%user, %location, error = %e, "host could not place user");
                    TeleportOutcome::Failed
                }
            },
            LocalStep::Transfer(target) => match self.host.transfer(user, &target).await {
                Ok(()) => {
                    tracing::info!(%user, from = %self.server_name(), to = %target, "user sent to another server");
                    TeleportOutcome::Forwarded
                }
                Err(e) => {
                    tracing::error!(%user, to = %target, error = %e, "host could not transfer user");
                    TeleportOutcome::Failed
                }
            },
        }
    }

    /// Writes the user's pending teleport, replacing any older one.
    async fn queue(&self, user: UserId, location: Location) -> Result<(), SessionError> {
        let ttl_ms = self.config.pending_ttl_ms();

        for _ in 0..PENDING_ATTEMPTS {
            let version = self
                .store
                .get::<PendingTeleport>(&user.key())
                .await?
                .map_or(0, |p| p.version);
            let pending = PendingTeleport {
                user,
                location: location.clone(),
                created_at_ms: self.clock.now_ms(),
                ttl_ms,
                version,
            };

            match self.store.insert_or_update(&pending).await {
                Ok(_) => {
                    tracing::info!(%user, %location, "teleport queued");
                    return Ok(());
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(SessionError::Contended(user))
    }
}
