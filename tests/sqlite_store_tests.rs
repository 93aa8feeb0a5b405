//! End-to-end behavior against the SQLite store, including tampering through
//! raw SQL the way an attacker with database access would.

use audit_chain::{BreakKind, EntryStore, SqliteStore, VerifyScope};

mod common;
use common::*;

#[tokio::test]
async fn test_append_and_verify_through_sqlite() {
    let (_store, writer, verifier) = sqlite_setup().await;

    writer.append(draft("org-1", "entry A")).await.unwrap();
    writer.append(draft("org-1", "entry B")).await.unwrap();
    writer.append(draft("org-1", "entry C")).await.unwrap();

    let report = verifier.verify(&VerifyScope::all()).await;
    assert_eq!(report.total_entries, 3);
    assert_eq!(report.verified_entries, 3);
    assert!(report.broken_links.is_empty());
    assert!(report.is_valid);
}

#[tokio::test]
async fn test_sql_update_of_description_breaks_content() {
    let (store, writer, verifier) = sqlite_setup().await;

    writer.append(draft("org-1", "entry A")).await.unwrap();
    let tampered_id = writer.append(draft("org-1", "entry B")).await.unwrap();
    writer.append(draft("org-1", "entry C")).await.unwrap();

    sqlx::query("UPDATE audit_entries SET description = ? WHERE id = ?")
        .bind("rewritten post-commit")
        .bind(tampered_id.hyphenated().to_string())
        .execute(store.pool())
        .await
        .unwrap();

    let report = verifier.verify(&VerifyScope::all()).await;
    assert_eq!(report.total_entries, 3);
    assert_eq!(report.verified_entries, 2);
    assert_eq!(report.broken_links.len(), 1);
    assert!(!report.is_valid);

    let found = &report.broken_links[0];
    assert_eq!(found.entry_id, tampered_id);
    assert_eq!(found.kind, BreakKind::ContentMismatch);
}

#[tokio::test]
async fn test_sql_delete_breaks_link_at_successor() {
    let (store, writer, verifier) = sqlite_setup().await;

    writer.append(draft("org-1", "entry A")).await.unwrap();
    let deleted_id = writer.append(draft("org-1", "entry B")).await.unwrap();
    let successor_id = writer.append(draft("org-1", "entry C")).await.unwrap();

    sqlx::query("DELETE FROM audit_entries WHERE id = ?")
        .bind(deleted_id.hyphenated().to_string())
        .execute(store.pool())
        .await
        .unwrap();

    let report = verifier.verify(&VerifyScope::all()).await;
    assert_eq!(report.total_entries, 2);
    assert_eq!(report.broken_links.len(), 1);
    assert_eq!(report.broken_links[0].entry_id, successor_id);
    assert_eq!(report.broken_links[0].kind, BreakKind::BrokenLink);
}

#[tokio::test]
async fn test_windowed_scan_anchors_to_preceding_entry() {
    let (store, writer, verifier) = sqlite_setup().await;

    for i in 0..4 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }

    let entries = store
        .fetch_batch(&VerifyScope::partition("org-1"), None, 100)
        .await
        .unwrap();
    assert_eq!(entries.len(), 4);

    // Window starting at the third entry: linkage is established by fetching
    // the entry just before the window, so the scan still verifies cleanly.
    let scope = VerifyScope::partition("org-1").window(Some(entries[2].created_at), None);
    let report = verifier.verify(&scope).await;
    assert_eq!(report.total_entries, 2);
    assert_eq!(report.verified_entries, 2);
    assert!(report.is_valid);
    assert_eq!(report.first_entry_time, Some(entries[2].created_at));
    assert_eq!(report.last_entry_time, Some(entries[3].created_at));
}

#[tokio::test]
async fn test_windowed_scan_detects_tamper_before_window() {
    let (store, writer, verifier) = sqlite_setup().await;

    for i in 0..4 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }
    let entries = store
        .fetch_batch(&VerifyScope::partition("org-1"), None, 100)
        .await
        .unwrap();

    // Replace the anchor entry's digest: the first windowed entry no longer
    // links to what the store claims precedes it.
    sqlx::query("UPDATE audit_entries SET current_digest = ? WHERE id = ?")
        .bind("00".repeat(32))
        .bind(entries[1].id.hyphenated().to_string())
        .execute(store.pool())
        .await
        .unwrap();

    let scope = VerifyScope::partition("org-1").window(Some(entries[2].created_at), None);
    let report = verifier.verify(&scope).await;
    assert!(!report.is_valid);
    assert_eq!(report.broken_links.len(), 1);
    assert_eq!(report.broken_links[0].entry_id, entries[2].id);
    assert_eq!(report.broken_links[0].kind, BreakKind::BrokenLink);
}

#[tokio::test]
async fn test_time_window_excludes_to_bound() {
    let (store, writer, verifier) = sqlite_setup().await;

    for i in 0..3 {
        writer
            .append(draft("org-1", &format!("entry {}", i)))
            .await
            .unwrap();
    }
    let entries = store
        .fetch_batch(&VerifyScope::all(), None, 100)
        .await
        .unwrap();

    // [first, last): the final entry is excluded.
    let scope =
        VerifyScope::partition("org-1").window(Some(entries[0].created_at), Some(entries[2].created_at));
    let report = verifier.verify(&scope).await;
    assert_eq!(report.total_entries, 2);
    assert!(report.is_valid);
}

#[tokio::test]
async fn test_reopen_database_file_and_continue_chain() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("audit.db").display());

    let first_id;
    {
        let store = std::sync::Arc::new(SqliteStore::connect(&url).await.unwrap());
        let writer = audit_chain::AppendWriter::new(store.clone(), test_hasher());
        first_id = writer.append(draft("org-1", "before restart")).await.unwrap();
    }

    // A new process picks up the tail from disk and extends the same chain.
    let store = std::sync::Arc::new(SqliteStore::connect(&url).await.unwrap());
    let writer = audit_chain::AppendWriter::new(store.clone(), test_hasher());
    let second_id = writer.append(draft("org-1", "after restart")).await.unwrap();
    assert_ne!(first_id, second_id);

    let verifier = audit_chain::ChainVerifier::new(store, test_hasher());
    let report = verifier.verify(&VerifyScope::partition("org-1")).await;
    assert_eq!(report.total_entries, 2);
    assert!(report.is_valid);
}
