//! Record store abstraction for Lobbyforge.
//!
//! Every game server reads and writes the same rooms, invites, arenas and
//! pending teleports. This crate defines how the rest of Lobbyforge talks
//! to that shared storage without caring what it is:
//!
//! - [`Record`] — a typed row with a key and a version.
//! - [`RecordStore`] — CRUD access with version-checked writes.
//! - [`MemoryStore`] — an in-process implementation for tests, demos and
//!   single-host deployments.
//!
//! # Optimistic concurrency
//!
//! Writes carry the version the caller read. If the stored version moved
//! on in the meantime the write fails with
//! [`StoreError::VersionConflict`] and nothing changes. Callers re-read and
//! decide again. This is what makes an arena claim a real compare-and-set
//! across processes.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod record;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{Record, RecordKind};

use std::future::Future;

/// Typed CRUD access to the shared records.
///
/// Implementations must make `insert_or_update` and `delete` atomic with
/// respect to the version check: two writers holding the same version can
/// never both succeed.
pub trait RecordStore: Send + Sync + 'static {
    /// Reads one record by key.
    fn get<R: Record>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<R>, StoreError>> + Send;

    /// Returns the first record (in insertion order) matching `filter`.
    fn get_first<R, F>(
        &self,
        filter: F,
    ) -> impl Future<Output = Result<Option<R>, StoreError>> + Send
    where
        R: Record,
        F: Fn(&R) -> bool + Send;

    /// Returns every record matching `filter`, in insertion order.
    ///
    /// Updates keep a record's original position, so the order is stable
    /// and suitable for paging.
    fn list<R, F>(
        &self,
        filter: F,
    ) -> impl Future<Output = Result<Vec<R>, StoreError>> + Send
    where
        R: Record,
        F: Fn(&R) -> bool + Send;

    /// Inserts a new record (version 0) or updates an existing one whose
    /// stored version equals `record.version()`.
    ///
    /// Returns the record as stored, carrying its new version.
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] if the versions disagree, including
    /// updating a record that was deleted in the meantime.
    fn insert_or_update<R: Record>(
        &self,
        record: &R,
    ) -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Deletes a record if its stored version equals `record.version()`.
    ///
    /// Deleting a record that no longer exists succeeds.
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] if the record was changed since it
    /// was read.
    fn delete<R: Record>(
        &self,
        record: &R,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
