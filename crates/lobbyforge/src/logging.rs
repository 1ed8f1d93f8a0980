//! Log output setup for binaries that embed a node.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The level comes from `RUST_LOG` (e.g. `RUST_LOG=lobbyforge_room=debug`)
/// and defaults to `info`. Calling it again, or after the host installed
/// its own subscriber, does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
