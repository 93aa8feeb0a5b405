#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use audit_chain::{
    Actor, AppendWriter, AuditAction, ChainHasher, ChainVerifier, EntryDraft, InMemoryStore,
    IntegrityKey, SensitivityLevel, SqliteStore,
};

pub fn test_key() -> IntegrityKey {
    IntegrityKey::new(vec![0x42; 32]).expect("test key")
}

pub fn test_hasher() -> ChainHasher {
    ChainHasher::new(test_key())
}

/// A plausible draft for one sensitive action.
pub fn draft(partition: &str, description: &str) -> EntryDraft {
    EntryDraft {
        partition_key: partition.to_string(),
        actor: Actor::User("user-1".to_string()),
        action: AuditAction::Disclose,
        resource_type: "care_record".to_string(),
        resource_id: "rec-1".to_string(),
        sensitivity: SensitivityLevel::Confidential,
        description: description.to_string(),
        metadata: json!({ "request_id": "req-1" }),
        actor_network_address: Some("10.1.2.3".to_string()),
    }
}

/// In-memory store plus writer and verifier sharing one integrity key.
/// The verifier uses a deliberately tiny batch size so multi-batch cursor
/// handling is exercised by every test.
pub fn memory_setup() -> (
    Arc<InMemoryStore>,
    AppendWriter<InMemoryStore>,
    ChainVerifier<InMemoryStore>,
) {
    let store = Arc::new(InMemoryStore::new());
    let writer = AppendWriter::new(store.clone(), test_hasher());
    let verifier = ChainVerifier::new(store.clone(), test_hasher()).with_batch_size(2);
    (store, writer, verifier)
}

/// Setup a fresh in-memory SQLite database.
pub async fn sqlite_setup() -> (
    Arc<SqliteStore>,
    AppendWriter<SqliteStore>,
    ChainVerifier<SqliteStore>,
) {
    let store = Arc::new(SqliteStore::in_memory().await.expect("in-memory sqlite"));
    let writer = AppendWriter::new(store.clone(), test_hasher());
    let verifier = ChainVerifier::new(store.clone(), test_hasher()).with_batch_size(2);
    (store, writer, verifier)
}
