//! Tamper-evident audit chain
//!
//! Per-partition hash chains over immutable audit entries: canonical
//! encoding, keyed digests, serialized appends, and streaming verification.

pub mod canonical;
pub mod entry;
pub mod hasher;
pub mod report;
pub mod verifier;
pub mod writer;

pub use entry::{Actor, AuditAction, AuditEntry, EntryDraft, SensitivityLevel};
pub use hasher::{ChainHasher, IntegrityKey};
pub use report::{BreakKind, ChainBreak, VerificationReport};
pub use verifier::{ChainVerifier, ScanCheckpoint};
pub use writer::AppendWriter;
