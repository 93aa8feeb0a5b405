pub mod audit;
pub mod config;
pub mod error;
pub mod store;

pub use audit::{
    Actor, AppendWriter, AuditAction, AuditEntry, BreakKind, ChainBreak, ChainHasher,
    ChainVerifier, EntryDraft, IntegrityKey, ScanCheckpoint, SensitivityLevel,
    VerificationReport,
};
pub use config::AuditConfig;
pub use error::AuditError;
pub use store::{Cursor, EntryStore, InMemoryStore, SqliteStore, VerifyScope};
