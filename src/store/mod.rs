//! Entry storage
//!
//! The writer and verifier talk to storage through [`EntryStore`]; the
//! verifier in particular must never have to trust the store — everything it
//! reads is re-checked cryptographically. Two implementations ship here: a
//! sqlx/SQLite store for durability and an in-memory store for tests and
//! embedding.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::entry::AuditEntry;
use crate::error::AuditError;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// What a verification run covers: optionally one partition, optionally a
/// `[from, to)` time window. Empty scope means the full log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyScope {
    pub partition_key: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl VerifyScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn partition(partition_key: impl Into<String>) -> Self {
        VerifyScope {
            partition_key: Some(partition_key.into()),
            ..Self::default()
        }
    }

    pub fn window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Whether an entry falls inside this scope.
    pub fn contains(&self, entry: &AuditEntry) -> bool {
        if let Some(p) = &self.partition_key {
            if &entry.partition_key != p {
                return false;
            }
        }
        if let Some(from) = &self.from {
            if entry.created_at < *from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if entry.created_at >= *to {
                return false;
            }
        }
        true
    }
}

/// Keyset pagination position: the last entry already consumed. Batches
/// resume strictly after `(partition_key, created_at, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub partition_key: String,
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn after(entry: &AuditEntry) -> Self {
        Cursor {
            partition_key: entry.partition_key.clone(),
            created_at: entry.created_at,
            id: entry.id,
        }
    }

    fn key(&self) -> (&str, DateTime<Utc>, Uuid) {
        (&self.partition_key, self.created_at, self.id)
    }

    /// Scan-order comparison against an entry.
    pub fn is_before(&self, entry: &AuditEntry) -> bool {
        self.key() < (entry.partition_key.as_str(), entry.created_at, entry.id)
    }
}

/// The most recently committed entry of a partition, as seen by the writer.
#[derive(Debug, Clone)]
pub struct ChainTail {
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for audit entries.
///
/// `insert_entry` is the only mutation and must be atomic: it re-checks the
/// partition tail inside its own transaction and fails with
/// [`AuditError::AppendRace`] when the tail has moved, so a writer racing on
/// the same partition can never silently fork the chain.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Digest and timestamp of the partition's last entry, `None` for an
    /// empty partition.
    async fn chain_tail(&self, partition_key: &str) -> Result<Option<ChainTail>, AuditError>;

    /// Atomically commit a fully populated entry, rejecting stale tails.
    async fn insert_entry(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Fetch up to `limit` in-scope entries ordered by
    /// `(partition_key, created_at, id)`, strictly after `cursor`.
    async fn fetch_batch(
        &self,
        scope: &VerifyScope,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError>;

    /// The single entry of `partition_key` immediately before `before`, used
    /// to anchor a windowed scan to the preceding chain link.
    async fn entry_before(
        &self,
        partition_key: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<AuditEntry>, AuditError>;
}
