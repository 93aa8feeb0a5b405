//! Append Writer
//!
//! The only component permitted to extend a chain. Appends to the same
//! partition are serialized through a sharded lock table; appends to
//! different partitions never share a lock. The store's own tail check is a
//! second line of defense against writers in other processes — when it
//! fires, the append is retried from a fresh tail a bounded number of times
//! and then surfaced as a hard failure, never dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::canonical::truncate_to_micros;
use crate::audit::entry::{AuditEntry, EntryDraft};
use crate::audit::hasher::ChainHasher;
use crate::config::DEFAULT_APPEND_RETRIES;
use crate::error::AuditError;
use crate::store::EntryStore;

pub struct AppendWriter<S: EntryStore> {
    store: Arc<S>,
    hasher: ChainHasher,
    max_retries: u32,
    // Sharded per-partition serialization point. The outer std mutex only
    // guards the map itself and is never held across an await.
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: EntryStore> AppendWriter<S> {
    pub fn new(store: Arc<S>, hasher: ChainHasher) -> Self {
        AppendWriter {
            store,
            hasher,
            max_retries: DEFAULT_APPEND_RETRIES,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn partition_lock(&self, partition_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("partition lock table poisoned");
        locks
            .entry(partition_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one entry to its partition's chain and return its id.
    ///
    /// Timestamps are assigned here, monotonically per partition: when the
    /// wall clock is not ahead of the current tail (clock skew, bursts inside
    /// one microsecond), the new entry is stamped one microsecond past the
    /// tail so `(created_at, id)` order always matches chain order.
    pub async fn append(&self, draft: EntryDraft) -> Result<Uuid, AuditError> {
        let lock = self.partition_lock(&draft.partition_key);
        let _guard = lock.lock().await;

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;

            let tail = self.store.chain_tail(&draft.partition_key).await?;

            let now = truncate_to_micros(Utc::now());
            let created_at = match &tail {
                Some(tail) if tail.created_at >= now => {
                    tail.created_at + Duration::microseconds(1)
                }
                _ => now,
            };

            let mut entry = AuditEntry {
                id: Uuid::new_v4(),
                partition_key: draft.partition_key.clone(),
                actor: draft.actor.clone(),
                action: draft.action,
                resource_type: draft.resource_type.clone(),
                resource_id: draft.resource_id.clone(),
                sensitivity: draft.sensitivity,
                description: draft.description.clone(),
                metadata: draft.metadata.clone(),
                actor_network_address: draft.actor_network_address.clone(),
                created_at,
                previous_digest: tail.map(|t| t.digest),
                current_digest: String::new(),
            };
            entry.current_digest = self.hasher.digest_entry(&entry)?;

            match self.store.insert_entry(&entry).await {
                Ok(()) => {
                    debug!(
                        partition = %entry.partition_key,
                        entry_id = %entry.id,
                        action = entry.action.as_str(),
                        "appended audit entry"
                    );
                    return Ok(entry.id);
                }
                Err(err) if err.is_retryable() => {
                    if attempts > self.max_retries {
                        warn!(
                            partition = %draft.partition_key,
                            attempts,
                            "append retries exhausted"
                        );
                        return Err(AuditError::AppendRace {
                            partition_key: draft.partition_key,
                            attempts,
                        });
                    }
                    debug!(
                        partition = %draft.partition_key,
                        attempt = attempts,
                        "tail moved during append, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
