//! Arena allocation: the claim / activate / release state machine.
//!
//! ```text
//!  Free ──claim──→ Claimed ──activate──→ Activated
//!   ↑                 │                      │
//!   └────release──────┴──────release─────────┘
//! ```
//!
//! Arenas are provisioned by something outside this crate. Many servers
//! look at the same arenas at once, so every transition is a
//! compare-and-set against the stored version: read, decide, write with the
//! version that was read, and start over if another server wrote first.
//!
//! A claim that was never activated and whose room no longer exists is
//! abandoned (the room was disbanded, or its server died between claim and
//! activate). The next room to claim the arena takes it over.

use std::sync::Arc;
use std::time::Duration;

use lobbyforge_protocol::{Arena, ArenaId, GameType, Room, RoomId};
use lobbyforge_store::RecordStore;
use rand::Rng;
use tokio::sync::Mutex;

use crate::{CoordinatorConfig, RoomError};

/// Owns the claim and activation state of every [`Arena`].
pub struct ArenaAllocator<S: RecordStore> {
    store: Arc<S>,
    config: CoordinatorConfig,
    write_lock: Mutex<()>,
}

impl<S: RecordStore> ArenaAllocator<S> {
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Arenas of a game type that are not activated, oldest first.
    pub async fn list_available(
        &self,
        game_type: &GameType,
    ) -> Result<Vec<Arena>, RoomError> {
        let game_type = game_type.clone();
        Ok(self
            .store
            .list::<Arena, _>(move |arena| {
                arena.is_available() && arena.game_type == game_type
            })
            .await?)
    }

    /// The first available arena whose bounds admit `member_count`.
    pub async fn first_available(
        &self,
        game_type: &GameType,
        member_count: usize,
    ) -> Result<Option<Arena>, RoomError> {
        Ok(self
            .list_available(game_type)
            .await?
            .into_iter()
            .find(|arena| arena.admits(member_count)))
    }

    /// Looks up an arena.
    ///
    /// # Errors
    /// [`RoomError::ArenaNotFound`] if it does not exist.
    pub async fn get_arena(&self, arena_id: ArenaId) -> Result<Arena, RoomError> {
        self.store
            .get::<Arena>(&arena_id.key())
            .await?
            .ok_or(RoomError::ArenaNotFound(arena_id))
    }

    /// The activated arena a room is playing in, if any.
    pub async fn arena_for_room(
        &self,
        room_id: RoomId,
    ) -> Result<Option<Arena>, RoomError> {
        Ok(self
            .store
            .get_first::<Arena, _>(move |arena| {
                arena.activated && arena.claimed_by == Some(room_id)
            })
            .await?)
    }

    /// Claims an arena for a room of `member_count` players.
    ///
    /// Claiming an arena the room already holds changes nothing. An
    /// abandoned claim (not activated, room gone) is taken over.
    ///
    /// # Errors
    /// - [`RoomError::ArenaNotFound`] if the arena does not exist
    /// - [`RoomError::ArenaAlreadyClaimed`] if another live room holds it
    /// - [`RoomError::TooFewPlayers`] / [`RoomError::TooManyPlayers`] if the
    ///   count is outside the arena's bounds
    /// - [`RoomError::Contended`] if every attempt lost a race
    pub async fn claim(
        &self,
        arena_id: ArenaId,
        room_id: RoomId,
        member_count: usize,
    ) -> Result<Arena, RoomError> {
        let _guard = self.write_lock.lock().await;

        let mut abandoned: Option<RoomId> = None;
        loop {
            let takeover = abandoned;
            let result = self
                .compare_and_set(arena_id, move |arena| {
                    if let Some(holder) = arena.claimed_by {
                        let stale = !arena.activated && takeover == Some(holder);
                        if holder != room_id && !stale {
                            return Err(RoomError::ArenaAlreadyClaimed {
                                arena: arena_id,
                                holder,
                            });
                        }
                    }
                    if member_count < arena.min_players {
                        return Err(RoomError::TooFewPlayers {
                            arena: arena_id,
                            count: member_count,
                            min: arena.min_players,
                        });
                    }
                    if member_count > arena.max_players {
                        return Err(RoomError::TooManyPlayers {
                            arena: arena_id,
                            count: member_count,
                            max: arena.max_players,
                        });
                    }
                    if arena.claimed_by == Some(room_id) {
                        return Ok(false);
                    }
                    arena.claimed_by = Some(room_id);
                    Ok(true)
                })
                .await;

            match result {
                Err(e @ RoomError::ArenaAlreadyClaimed { holder, .. })
                    if abandoned != Some(holder) =>
                {
                    if !self.is_abandoned(arena_id, holder).await? {
                        return Err(e);
                    }
                    tracing::info!(%arena_id, %holder, %room_id, "taking over abandoned claim");
                    abandoned = Some(holder);
                }
                result => {
                    let arena = result?;
                    tracing::info!(%arena_id, %room_id, server = %arena.server_name, "arena claimed");
                    return Ok(arena);
                }
            }
        }
    }

    /// Marks a claimed arena as in play. Activating twice changes nothing.
    ///
    /// # Errors
    /// - [`RoomError::ArenaNotFound`] if the arena does not exist
    /// - [`RoomError::ArenaNotClaimed`] if nobody claimed it
    pub async fn activate(&self, arena_id: ArenaId) -> Result<Arena, RoomError> {
        let _guard = self.write_lock.lock().await;

        let arena = self
            .compare_and_set(arena_id, |arena| {
                if arena.claimed_by.is_none() {
                    return Err(RoomError::ArenaNotClaimed(arena_id));
                }
                if arena.activated {
                    return Ok(false);
                }
                arena.activated = true;
                Ok(true)
            })
            .await?;

        tracing::info!(%arena_id, room_id = ?arena.claimed_by, "arena activated");
        Ok(arena)
    }

    /// Returns an arena to the free pool. Releasing a free or missing
    /// arena is fine.
    pub async fn release(&self, arena_id: ArenaId) -> Result<(), RoomError> {
        let _guard = self.write_lock.lock().await;

        let result = self
            .compare_and_set(arena_id, |arena| {
                if arena.claimed_by.is_none() && !arena.activated {
                    return Ok(false);
                }
                arena.claimed_by = None;
                arena.activated = false;
                Ok(true)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(%arena_id, "arena released");
                Ok(())
            }
            Err(RoomError::ArenaNotFound(_)) => {
                tracing::debug!(%arena_id, "release of unknown arena ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Claims the first available arena that fits the room.
    ///
    /// Candidates are tried in order; one that another room grabbed (or
    /// that changed shape) since it was listed is skipped. Returns `None`
    /// when no candidate could be claimed.
    pub async fn claim_first_available(
        &self,
        game_type: &GameType,
        room_id: RoomId,
        member_count: usize,
    ) -> Result<Option<Arena>, RoomError> {
        let candidates = self.list_available(game_type).await?;

        for candidate in candidates.into_iter().filter(|a| a.admits(member_count)) {
            match self.claim(candidate.id, room_id, member_count).await {
                Ok(arena) => return Ok(Some(arena)),
                Err(
                    e @ (RoomError::ArenaAlreadyClaimed { .. }
                    | RoomError::ArenaNotFound(_)
                    | RoomError::TooFewPlayers { .. }
                    | RoomError::TooManyPlayers { .. }
                    | RoomError::Contended(_)),
                ) => {
                    tracing::debug!(arena_id = %candidate.id, %room_id, error = %e, "candidate lost, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Read, apply `update`, write back with the version that was read.
    ///
    /// `update` returns `Ok(false)` when the arena is already in the wanted
    /// state; nothing is written then. A version conflict re-reads and
    /// re-applies after a short random pause, up to the configured limit.
    async fn compare_and_set<F>(
        &self,
        arena_id: ArenaId,
        mut update: F,
    ) -> Result<Arena, RoomError>
    where
        F: FnMut(&mut Arena) -> Result<bool, RoomError> + Send,
    {
        let attempts = self.config.claim_retry_limit.max(1);

        for attempt in 1..=attempts {
            let mut arena = self.get_arena(arena_id).await?;
            if !update(&mut arena)? {
                return Ok(arena);
            }

            match self.store.insert_or_update(&arena).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%arena_id, attempt, "arena write lost a race, retrying");
                    if attempt < attempts {
                        tokio::time::sleep(self.jitter()).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(%arena_id, attempts, "giving up on contended arena");
        Err(RoomError::Contended(arena_id))
    }

    /// Returns `true` if `holder`'s claim on the arena was never activated
    /// and the room no longer exists.
    async fn is_abandoned(&self, arena_id: ArenaId, holder: RoomId) -> Result<bool, RoomError> {
        let arena = self.get_arena(arena_id).await?;
        if arena.activated || arena.claimed_by != Some(holder) {
            return Ok(false);
        }
        Ok(self.store.get::<Room>(&holder.key()).await?.is_none())
    }

    fn jitter(&self) -> Duration {
        let max = self.config.retry_jitter_ms;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}
