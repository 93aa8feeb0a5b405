//! Verifier streaming behavior: resumable checkpoints, merged segment
//! reports, and partial results when the store fails mid-scan.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use audit_chain::{
    AppendWriter, AuditEntry, AuditError, ChainVerifier, Cursor, EntryStore, InMemoryStore,
    VerificationReport, VerifyScope,
};
use audit_chain::store::ChainTail;

mod common;
use common::*;

#[tokio::test]
async fn test_segmented_scan_matches_full_scan() {
    let (_store, writer, verifier) = memory_setup();

    for i in 0..7 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }

    let full = verifier.verify(&VerifyScope::all()).await;
    assert!(full.is_valid);
    assert_eq!(full.total_entries, 7);

    // Re-run one batch at a time, resuming from the returned checkpoint.
    let scope = VerifyScope::all();
    let mut merged = VerificationReport::new();
    let mut checkpoint = None;
    let mut segments = 0;
    loop {
        let (segment, next) = verifier
            .verify_segment(&scope, checkpoint.take(), Some(1))
            .await;
        merged = if segments == 0 {
            segment
        } else {
            merged.merge(segment)
        };
        segments += 1;
        match next {
            Some(cp) => checkpoint = Some(cp),
            None => break,
        }
        assert!(segments < 20, "scan must terminate");
    }

    // Batch size 2 over 7 entries: at least four fetches.
    assert!(segments >= 4);
    assert_eq!(merged, full);
}

#[tokio::test]
async fn test_resumed_scan_still_finds_breaks() {
    let (store, writer, verifier) = memory_setup();

    for i in 0..6 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }
    store
        .corrupt_entry("org-1", 4, |entry| {
            entry.description = "tampered".to_string();
        })
        .await;

    let scope = VerifyScope::all();
    let (first_segment, checkpoint) = verifier.verify_segment(&scope, None, Some(1)).await;
    assert_eq!(first_segment.total_entries, 2);
    let checkpoint = checkpoint.expect("entries remain");

    let (rest, none) = verifier.verify_segment(&scope, Some(checkpoint), None).await;
    assert!(none.is_none());

    let merged = first_segment.merge(rest);
    assert_eq!(merged.total_entries, 6);
    assert_eq!(merged.broken_links.len(), 1);
    assert!(!merged.is_valid);
}

/// Store wrapper that starts failing batch fetches after a set number of
/// calls, standing in for a database that dies mid-scan.
struct FlakyStore {
    inner: InMemoryStore,
    fetches_before_failure: AtomicUsize,
}

#[async_trait]
impl EntryStore for FlakyStore {
    async fn chain_tail(&self, partition_key: &str) -> Result<Option<ChainTail>, AuditError> {
        self.inner.chain_tail(partition_key).await
    }

    async fn insert_entry(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.inner.insert_entry(entry).await
    }

    async fn fetch_batch(
        &self,
        scope: &VerifyScope,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        if self.fetches_before_failure.fetch_sub(1, Ordering::SeqCst) == 0 {
            return Err(AuditError::Fetch("connection lost".to_string()));
        }
        self.inner.fetch_batch(scope, cursor, limit).await
    }

    async fn entry_before(
        &self,
        partition_key: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<AuditEntry>, AuditError> {
        self.inner.entry_before(partition_key, before).await
    }
}

#[tokio::test]
async fn test_fetch_failure_yields_incomplete_partial_report() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        // Allow two successful fetches (4 entries), then fail.
        fetches_before_failure: AtomicUsize::new(2),
    });
    let writer = AppendWriter::new(store.clone(), test_hasher());
    for i in 0..6 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }

    let verifier = ChainVerifier::new(store, test_hasher()).with_batch_size(2);
    let (report, checkpoint) = verifier.verify_segment(&VerifyScope::all(), None, None).await;

    // Partial results for the completed batches, clearly marked incomplete
    // and never valid.
    assert_eq!(report.total_entries, 4);
    assert_eq!(report.verified_entries, 4);
    assert!(!report.complete);
    assert!(!report.is_valid);
    assert!(checkpoint.is_some(), "aborted scans must be resumable");
}
