//! Chain Verifier
//!
//! Streams entries in `(partition_key, created_at, id)` order, batch by
//! batch, recomputing every digest and flagging discontinuities. Memory use
//! is bounded by the batch size regardless of how many rows the log holds.
//! The verifier only reads; a broken chain is reported, never repaired.
//!
//! Each scan moves Idle → Fetching(batch) → Verifying(batch) →
//! {Fetching(next) | Done}; `Done` is always reached unless the store itself
//! fails, in which case the partial report is returned marked incomplete.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::entry::AuditEntry;
use crate::audit::hasher::ChainHasher;
use crate::audit::report::{BreakKind, ChainBreak, VerificationReport};
use crate::config::DEFAULT_VERIFY_BATCH_SIZE;
use crate::error::AuditError;
use crate::store::{Cursor, EntryStore, VerifyScope};

/// Where a paused scan left off: the last verified entry's position and its
/// stored digest, which the next entry in that partition must link to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub cursor: Cursor,
    pub tail_digest: String,
}

pub struct ChainVerifier<S: EntryStore> {
    store: Arc<S>,
    hasher: ChainHasher,
    batch_size: usize,
}

/// Per-partition linkage state carried across batch boundaries.
struct PartitionState {
    partition_key: String,
    /// Digest the next entry's `previous_digest` must equal; `None` means
    /// the next entry should be the partition's genesis.
    expected_prev: Option<String>,
}

impl<S: EntryStore> ChainVerifier<S> {
    pub fn new(store: Arc<S>, hasher: ChainHasher) -> Self {
        ChainVerifier {
            store,
            hasher,
            batch_size: DEFAULT_VERIFY_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be at least 1");
        self.batch_size = batch_size;
        self
    }

    /// Run a full scan over `scope` and return the report.
    pub async fn verify(&self, scope: &VerifyScope) -> VerificationReport {
        let (report, _) = self.verify_segment(scope, None, None).await;
        report
    }

    /// Run at most `max_batches` batches, resuming from `checkpoint` if one
    /// is given. Returns the segment report and, when entries remain, the
    /// checkpoint to resume from. Long sweeps use this to survive timeouts
    /// instead of restarting from the beginning; the scan is read-only, so
    /// stopping at any batch boundary is always safe.
    ///
    /// `report.complete` refers to the scanned segment: it is `false` only
    /// when the store failed mid-scan. A returned checkpoint means more of
    /// the scope remains; callers accumulate segments with
    /// [`VerificationReport::merge`].
    pub async fn verify_segment(
        &self,
        scope: &VerifyScope,
        checkpoint: Option<ScanCheckpoint>,
        max_batches: Option<usize>,
    ) -> (VerificationReport, Option<ScanCheckpoint>) {
        let mut report = VerificationReport::new();

        let (mut cursor, mut partition) = match checkpoint {
            Some(cp) => (
                Some(cp.cursor.clone()),
                Some(PartitionState {
                    partition_key: cp.cursor.partition_key,
                    expected_prev: Some(cp.tail_digest),
                }),
            ),
            None => (None, None),
        };

        let mut batches_done = 0usize;
        loop {
            if max_batches.is_some_and(|max| batches_done >= max) {
                report.finalize(true);
                return (report, self.checkpoint_from(&cursor, &partition));
            }

            // Fetching
            let batch = match self
                .store
                .fetch_batch(scope, cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "scan aborted: batch fetch failed");
                    report.finalize(false);
                    return (report, self.checkpoint_from(&cursor, &partition));
                }
            };

            if batch.is_empty() {
                report.finalize(true);
                info!(
                    total = report.total_entries,
                    verified = report.verified_entries,
                    breaks = report.broken_links.len(),
                    "audit chain scan finished"
                );
                return (report, None);
            }

            // Verifying
            for entry in &batch {
                if let Err(err) = self.advance_partition(scope, &mut partition, entry).await {
                    warn!(error = %err, "scan aborted: anchor fetch failed");
                    report.finalize(false);
                    return (report, self.checkpoint_from(&cursor, &partition));
                }

                let state = partition.as_mut().expect("partition state initialized");
                let mut clean = true;

                if let Some(link_break) = check_link(entry, &state.expected_prev) {
                    warn!(entry_id = %entry.id, issue = %link_break.kind, "chain break");
                    report.broken_links.push(link_break);
                    clean = false;
                }

                if let Some(content_break) = self.check_content(entry) {
                    warn!(entry_id = %entry.id, issue = %content_break.kind, "chain break");
                    report.broken_links.push(content_break);
                    clean = false;
                }

                report.observe(entry.created_at, clean);
                state.expected_prev = Some(entry.current_digest.clone());
                cursor = Some(Cursor::after(entry));
            }

            batches_done += 1;
        }
    }

    /// On entering a new partition, establish what its first in-scope entry
    /// must link to. A scan window starting mid-partition is anchored by
    /// fetching the one entry immediately before the window; with no `from`
    /// bound (or no earlier entry) the first entry must be a genesis.
    async fn advance_partition(
        &self,
        scope: &VerifyScope,
        partition: &mut Option<PartitionState>,
        entry: &AuditEntry,
    ) -> Result<(), AuditError> {
        if partition
            .as_ref()
            .is_some_and(|p| p.partition_key == entry.partition_key)
        {
            return Ok(());
        }

        let expected_prev = match scope.from {
            Some(from) => self
                .store
                .entry_before(&entry.partition_key, from)
                .await?
                .map(|anchor| anchor.current_digest),
            None => None,
        };

        *partition = Some(PartitionState {
            partition_key: entry.partition_key.clone(),
            expected_prev,
        });
        Ok(())
    }

    /// Recompute the entry's digest over its stored content and stored
    /// `previous_digest`. Checking against the stored link (rather than the
    /// predecessor's digest) keeps content verification independent of
    /// linkage, so a deleted row shows up as exactly one link break at its
    /// successor instead of a cascading pair.
    fn check_content(&self, entry: &AuditEntry) -> Option<ChainBreak> {
        let matches = match self.hasher.digest_entry(entry) {
            Ok(recomputed) => recomputed == entry.current_digest,
            // Content that can no longer be canonicalized cannot reproduce
            // its digest either way.
            Err(_) => false,
        };
        if matches {
            return None;
        }
        Some(ChainBreak {
            entry_id: entry.id,
            entry_time: entry.created_at,
            partition_key: entry.partition_key.clone(),
            expected_previous_digest: entry.previous_digest.clone(),
            actual_previous_digest: entry.previous_digest.clone(),
            kind: BreakKind::ContentMismatch,
        })
    }

    fn checkpoint_from(
        &self,
        cursor: &Option<Cursor>,
        partition: &Option<PartitionState>,
    ) -> Option<ScanCheckpoint> {
        let cursor = cursor.clone()?;
        let tail_digest = partition.as_ref()?.expected_prev.clone()?;
        Some(ScanCheckpoint {
            cursor,
            tail_digest,
        })
    }
}

fn check_link(entry: &AuditEntry, expected_prev: &Option<String>) -> Option<ChainBreak> {
    let kind = match (expected_prev, &entry.previous_digest) {
        (None, None) => return None,
        (None, Some(_)) => BreakKind::InvalidGenesis,
        (Some(expected), actual) if actual.as_ref() != Some(expected) => BreakKind::BrokenLink,
        _ => return None,
    };
    Some(ChainBreak {
        entry_id: entry.id,
        entry_time: entry.created_at,
        partition_key: entry.partition_key.clone(),
        expected_previous_digest: expected_prev.clone(),
        actual_previous_digest: entry.previous_digest.clone(),
        kind,
    })
}
