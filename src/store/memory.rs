//! In-memory entry store
//!
//! Backing store for tests and for embedding the audit core without a
//! database. Enforces the same tail discipline as the SQLite store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::audit::entry::AuditEntry;
use crate::error::AuditError;
use crate::store::{ChainTail, Cursor, EntryStore, VerifyScope};

#[derive(Default)]
pub struct InMemoryStore {
    // Per partition, entries in append order.
    partitions: Mutex<HashMap<String, Vec<AuditEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in one partition.
    pub async fn partition_len(&self, partition_key: &str) -> usize {
        self.partitions
            .lock()
            .await
            .get(partition_key)
            .map_or(0, Vec::len)
    }

    /// Snapshot of one partition's entries in chain order.
    pub async fn partition_entries(&self, partition_key: &str) -> Vec<AuditEntry> {
        self.partitions
            .lock()
            .await
            .get(partition_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Tamper simulation: mutate a stored entry in place, bypassing the
    /// append-only discipline. Exists so tests can play the attacker.
    #[doc(hidden)]
    pub async fn corrupt_entry<F>(&self, partition_key: &str, index: usize, mutate: F)
    where
        F: FnOnce(&mut AuditEntry),
    {
        let mut partitions = self.partitions.lock().await;
        let entries = partitions
            .get_mut(partition_key)
            .expect("unknown partition in corrupt_entry");
        mutate(&mut entries[index]);
    }

    /// Tamper simulation: silently drop a stored entry.
    #[doc(hidden)]
    pub async fn delete_entry_unchecked(&self, partition_key: &str, index: usize) {
        let mut partitions = self.partitions.lock().await;
        let entries = partitions
            .get_mut(partition_key)
            .expect("unknown partition in delete_entry_unchecked");
        entries.remove(index);
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    async fn chain_tail(&self, partition_key: &str) -> Result<Option<ChainTail>, AuditError> {
        let partitions = self.partitions.lock().await;
        Ok(partitions
            .get(partition_key)
            .and_then(|entries| entries.last())
            .map(|last| ChainTail {
                digest: last.current_digest.clone(),
                created_at: last.created_at,
            }))
    }

    async fn insert_entry(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut partitions = self.partitions.lock().await;
        let entries = partitions
            .entry(entry.partition_key.clone())
            .or_default();

        let tail = entries.last().map(|e| e.current_digest.as_str());
        if tail != entry.previous_digest.as_deref() {
            return Err(AuditError::AppendRace {
                partition_key: entry.partition_key.clone(),
                attempts: 1,
            });
        }

        entries.push(entry.clone());
        Ok(())
    }

    async fn fetch_batch(
        &self,
        scope: &VerifyScope,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let partitions = self.partitions.lock().await;

        let mut matching: Vec<AuditEntry> = partitions
            .values()
            .flatten()
            .filter(|e| scope.contains(e))
            .filter(|e| cursor.map_or(true, |c| c.is_before(e)))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            (a.partition_key.as_str(), a.created_at, a.id)
                .cmp(&(b.partition_key.as_str(), b.created_at, b.id))
        });
        matching.truncate(limit);
        Ok(matching)
    }

    async fn entry_before(
        &self,
        partition_key: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let partitions = self.partitions.lock().await;
        Ok(partitions
            .get(partition_key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.created_at < before)
                    .max_by_key(|e| (e.created_at, e.id))
                    .cloned()
            })
            .unwrap_or(None))
    }
}
