//! In-process [`RecordStore`] backed by a mutex-guarded map.
//!
//! Rows are stored as JSON values, exactly as a document database would
//! hold them, so a record that fails to decode shows up here the same way
//! it would in production.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{Record, RecordKind, RecordStore, StoreError};

struct Row {
    /// Insertion order. Survives updates so listings stay stable.
    seq: u64,
    version: u64,
    data: serde_json::Value,
}

#[derive(Default)]
struct Tables {
    next_seq: u64,
    rows: HashMap<(RecordKind, String), Row>,
}

impl Tables {
    fn decode<R: Record>(key: &str, row: &Row) -> Result<R, StoreError> {
        let mut record: R = serde_json::from_value(row.data.clone())
            .map_err(|source| StoreError::Corrupt {
                kind: R::KIND,
                key: key.to_string(),
                source,
            })?;
        record.set_version(row.version);
        Ok(record)
    }

    /// All rows of one kind, oldest first.
    fn ordered<R: Record>(&self) -> Vec<(&str, &Row)> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|((kind, _), _)| *kind == R::KIND)
            .map(|((_, key), row)| (key.as_str(), row))
            .collect();
        rows.sort_by_key(|(_, row)| row.seq);
        rows
    }
}

/// A [`RecordStore`] that lives in memory.
///
/// Cheap to clone: clones share the same tables, so several
/// [`LobbyNode`](https://docs.rs/lobbyforge)s in one process can act as
/// independent game servers over one "database".
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of a kind.
    pub async fn count(&self, kind: RecordKind) -> usize {
        let tables = self.tables.lock().await;
        tables.rows.keys().filter(|(k, _)| *k == kind).count()
    }
}

impl RecordStore for MemoryStore {
    async fn get<R: Record>(
        &self,
        key: &str,
    ) -> Result<Option<R>, StoreError> {
        let tables = self.tables.lock().await;
        match tables.rows.get(&(R::KIND, key.to_string())) {
            Some(row) => Tables::decode(key, row).map(Some),
            None => Ok(None),
        }
    }

    async fn get_first<R, F>(
        &self,
        filter: F,
    ) -> Result<Option<R>, StoreError>
    where
        R: Record,
        F: Fn(&R) -> bool + Send,
    {
        let tables = self.tables.lock().await;
        for (key, row) in tables.ordered::<R>() {
            let record: R = Tables::decode(key, row)?;
            if filter(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn list<R, F>(&self, filter: F) -> Result<Vec<R>, StoreError>
    where
        R: Record,
        F: Fn(&R) -> bool + Send,
    {
        let tables = self.tables.lock().await;
        let mut out = Vec::new();
        for (key, row) in tables.ordered::<R>() {
            let record: R = Tables::decode(key, row)?;
            if filter(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn insert_or_update<R: Record>(
        &self,
        record: &R,
    ) -> Result<R, StoreError> {
        let key = record.key();
        let data = serde_json::to_value(record).map_err(|source| {
            StoreError::Encode {
                kind: R::KIND,
                source,
            }
        })?;

        let mut tables = self.tables.lock().await;
        let slot = (R::KIND, key.clone());

        let (seq, version) = match tables.rows.get(&slot) {
            Some(row) if row.version == record.version() => {
                (row.seq, row.version + 1)
            }
            Some(row) => {
                return Err(StoreError::VersionConflict {
                    kind: R::KIND,
                    key,
                    expected: record.version(),
                    found: Some(row.version),
                });
            }
            None if record.version() == 0 => {
                let seq = tables.next_seq;
                tables.next_seq += 1;
                (seq, 1)
            }
            None => {
                return Err(StoreError::VersionConflict {
                    kind: R::KIND,
                    key,
                    expected: record.version(),
                    found: None,
                });
            }
        };

        tables.rows.insert(slot, Row { seq, version, data });
        tracing::trace!(kind = %R::KIND, %key, version, "record written");

        let mut stored = record.clone();
        stored.set_version(version);
        Ok(stored)
    }

    async fn delete<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let key = record.key();
        let mut tables = self.tables.lock().await;
        let slot = (R::KIND, key.clone());

        match tables.rows.get(&slot) {
            None => Ok(()),
            Some(row) if row.version == record.version() => {
                tables.rows.remove(&slot);
                tracing::trace!(kind = %R::KIND, %key, "record deleted");
                Ok(())
            }
            Some(row) => Err(StoreError::VersionConflict {
                kind: R::KIND,
                key,
                expected: record.version(),
                found: Some(row.version),
            }),
        }
    }
}
