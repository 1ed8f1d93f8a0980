//! The presence tracker: who is connected to this server right now.
//!
//! Each game server keeps its own tracker. There is no shared presence
//! table: "where is user X?" is answered by asking every server over the
//! bus, and each one looks in its own tracker.
//!
//! # Concurrency note
//!
//! `PresenceTracker` is NOT thread-safe by itself. It is a plain
//! `HashMap` owned by the [`TeleportCoordinator`](crate::TeleportCoordinator),
//! which wraps it in a mutex. That same mutex is what makes "is the user
//! here?" and "queue a teleport for later" one atomic step.

use std::collections::HashMap;
use std::time::Instant;

use lobbyforge_protocol::UserId;

use crate::SessionError;

/// The set of users with a live session on this server.
///
/// ```text
/// connect() ──→ [Online] ──→ disconnect() ──→ (gone)
/// ```
#[derive(Debug, Default)]
pub struct PresenceTracker {
    /// When each connected user's session started.
    sessions: HashMap<UserId, Instant>,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a user connected.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the user is already here.
    pub fn connect(&mut self, user: UserId) -> Result<(), SessionError> {
        if self.sessions.contains_key(&user) {
            return Err(SessionError::AlreadyConnected(user));
        }
        self.sessions.insert(user, Instant::now());
        tracing::info!(%user, "session established");
        Ok(())
    }

    /// Records that a user left.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the user was not here.
    pub fn disconnect(&mut self, user: UserId) -> Result<(), SessionError> {
        let since = self
            .sessions
            .remove(&user)
            .ok_or(SessionError::NotFound(user))?;
        tracing::info!(%user, online_secs = since.elapsed().as_secs(), "session ended");
        Ok(())
    }

    /// Returns `true` if the user is connected here.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.sessions.contains_key(user)
    }

    /// Everyone connected here, sorted so that output is stable.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.sessions.keys().copied().collect();
        users.sort();
        users
    }

    /// Number of connected users.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
