//! StateStore — redb-backed persistence for scaling history.
//!
//! The store supports both on-disk and in-memory backends (the latter for
//! testing). History is append-only from the control loop's point of view;
//! retention is enforced by `prune_history`.

use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Closure turning any redb error into `StateError::Storage` for `op`.
macro_rules! storage_err {
    ($op:literal) => {
        |e| StateError::Storage {
            op: $op,
            reason: e.to_string(),
        }
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| StateError::Open {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open {
                location: "memory".into(),
                reason: e.to_string(),
            })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage_err!("begin write"))?;
        txn.open_table(HISTORY).map_err(storage_err!("open table"))?;
        txn.commit().map_err(storage_err!("commit"))?;
        Ok(())
    }

    /// Append a history record. A record with the same cluster and
    /// timestamp replaces the earlier one.
    pub fn append_history(&self, record: &HistoryRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(|source| StateError::Encode {
            cluster_id: record.cluster_id.clone(),
            source,
        })?;
        let txn = self.db.begin_write().map_err(storage_err!("begin write"))?;
        {
            let mut table = txn.open_table(HISTORY).map_err(storage_err!("open table"))?;
            table
                .insert(record.table_key(), value.as_slice())
                .map_err(storage_err!("insert"))?;
        }
        txn.commit().map_err(storage_err!("commit"))?;
        debug!(
            cluster = %record.cluster_id,
            recorded_at = record.recorded_at,
            action = %record.action,
            "history record stored"
        );
        Ok(())
    }

    /// Most recent history records for a cluster, newest first.
    pub fn list_history(&self, cluster_id: &str, limit: usize) -> StateResult<Vec<HistoryRecord>> {
        let txn = self.db.begin_read().map_err(storage_err!("begin read"))?;
        let table = txn.open_table(HISTORY).map_err(storage_err!("open table"))?;
        let mut results = Vec::new();
        for entry in table
            .range(cluster_range(cluster_id))
            .map_err(storage_err!("range"))?
            .rev()
        {
            if results.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(storage_err!("read"))?;
            let record: HistoryRecord =
                serde_json::from_slice(value.value()).map_err(|source| StateError::Decode {
                    cluster_id: cluster_id.to_string(),
                    recorded_at: key.value().1,
                    source,
                })?;
            results.push(record);
        }
        Ok(results)
    }

    /// Drop all but the newest `keep` records of a cluster. Returns the
    /// number of records removed.
    pub fn prune_history(&self, cluster_id: &str, keep: usize) -> StateResult<usize> {
        // Collect stale timestamps in a read transaction first.
        let stale: Vec<u64> = {
            let txn = self.db.begin_read().map_err(storage_err!("begin read"))?;
            let table = txn.open_table(HISTORY).map_err(storage_err!("open table"))?;
            let mut stamps = Vec::new();
            for entry in table
                .range(cluster_range(cluster_id))
                .map_err(storage_err!("range"))?
                .rev()
                .skip(keep)
            {
                let (key, _) = entry.map_err(storage_err!("read"))?;
                stamps.push(key.value().1);
            }
            stamps
        };
        if stale.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(storage_err!("begin write"))?;
        {
            let mut table = txn.open_table(HISTORY).map_err(storage_err!("open table"))?;
            for &recorded_at in &stale {
                table
                    .remove((cluster_id, recorded_at))
                    .map_err(storage_err!("remove"))?;
            }
        }
        txn.commit().map_err(storage_err!("commit"))?;
        debug!(%cluster_id, removed = stale.len(), "history pruned");
        Ok(stale.len())
    }
}

/// Every key of one cluster, oldest first.
fn cluster_range(cluster_id: &str) -> RangeInclusive<(&str, u64)> {
    (cluster_id, 0)..=(cluster_id, u64::MAX)
}
