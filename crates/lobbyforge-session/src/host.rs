//! The hook into the game server that actually moves players.
//!
//! Lobbyforge decides *where* a player should go. Putting them there is
//! the game server's job: loading a world, placing an entity, handing the
//! connection to another server through the proxy. The [`HostRuntime`]
//! trait is that seam. The integrator implements it once per server type;
//! tests use a recording mock.

use std::future::Future;

use lobbyforge_protocol::{Location, UserId};

use crate::SessionError;

/// The game server this node runs inside.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared by every task of the node.
/// - `'static` → lives as long as the node does.
///
/// # Example
///
/// ```rust
/// use lobbyforge_protocol::{Location, UserId};
/// use lobbyforge_session::{HostRuntime, SessionError};
///
/// /// A host that only knows one world and prints instead of moving.
/// struct PrintingHost;
///
/// impl HostRuntime for PrintingHost {
///     async fn apply_teleport(
///         &self,
///         user: UserId,
///         location: &Location,
///     ) -> Result<(), SessionError> {
///         match location.world.as_deref() {
///             Some("world") | None => {
///                 println!("{user} -> {location}");
///                 Ok(())
///             }
///             Some(other) => Err(SessionError::UnknownWorld(other.into())),
///         }
///     }
///
///     async fn transfer(&self, user: UserId, server: &str) -> Result<(), SessionError> {
///         println!("{user} => {server}");
///         Ok(())
///     }
///
///     async fn send_message(&self, user: UserId, text: &str) {
///         println!("[{user}] {text}");
///     }
///
///     async fn broadcast(&self, text: &str) {
///         println!("[all] {text}");
///     }
/// }
/// ```
pub trait HostRuntime: Send + Sync + 'static {
    /// Places a user who is connected to this server at `location`.
    ///
    /// A server-only location means "anywhere on this server"; hosts
    /// usually treat it as nothing to do.
    ///
    /// # Errors
    /// [`SessionError::UnknownWorld`] if the world does not exist here.
    fn apply_teleport(
        &self,
        user: UserId,
        location: &Location,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Sends a user who is connected to this server over to `server`.
    fn transfer(
        &self,
        user: UserId,
        server: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Shows a message to one user, if they are connected here.
    fn send_message(&self, user: UserId, text: &str) -> impl Future<Output = ()> + Send;

    /// Shows a message to everyone connected here.
    fn broadcast(&self, text: &str) -> impl Future<Output = ()> + Send;
}
