//! Verification Report
//!
//! Structured result of a chain scan. A broken chain is a *result*, not an
//! error: every break in range is enumerated with enough context to locate
//! and triage it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Stored `previous_digest` does not match the preceding entry's stored
    /// `current_digest` — an entry was removed or inserted.
    BrokenLink,
    /// Recomputed digest does not match the stored `current_digest` — the
    /// entry's own content was altered after commit.
    ContentMismatch,
    /// A partition's first entry claims a predecessor.
    InvalidGenesis,
}

impl std::fmt::Display for BreakKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakKind::BrokenLink => "previous-digest link mismatch",
            BreakKind::ContentMismatch => "content hash mismatch",
            BreakKind::InvalidGenesis => "unexpected predecessor on first partition entry",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub entry_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub partition_key: String,
    pub expected_previous_digest: Option<String>,
    pub actual_previous_digest: Option<String>,
    pub kind: BreakKind,
}

impl ChainBreak {
    /// Human-readable one-liner for operator output.
    pub fn describe(&self) -> String {
        format!(
            "{}: entry {} in partition {} at {} (expected previous digest {}, found {})",
            self.kind,
            self.entry_id,
            self.partition_key,
            self.entry_time.to_rfc3339(),
            self.expected_previous_digest.as_deref().unwrap_or("none"),
            self.actual_previous_digest.as_deref().unwrap_or("none"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub total_entries: u64,
    pub verified_entries: u64,
    pub broken_links: Vec<ChainBreak>,
    pub first_entry_time: Option<DateTime<Utc>>,
    pub last_entry_time: Option<DateTime<Utc>>,
    /// False when the scan aborted early (store fetch failure). An
    /// incomplete scan is never reported valid.
    pub complete: bool,
    pub is_valid: bool,
}

impl VerificationReport {
    pub fn new() -> Self {
        VerificationReport {
            total_entries: 0,
            verified_entries: 0,
            broken_links: Vec::new(),
            first_entry_time: None,
            last_entry_time: None,
            complete: false,
            is_valid: false,
        }
    }

    /// Fold in one scanned entry's timestamps and totals.
    pub(crate) fn observe(&mut self, entry_time: DateTime<Utc>, clean: bool) {
        self.total_entries += 1;
        if clean {
            self.verified_entries += 1;
        }
        if self.first_entry_time.map_or(true, |t| entry_time < t) {
            self.first_entry_time = Some(entry_time);
        }
        if self.last_entry_time.map_or(true, |t| entry_time > t) {
            self.last_entry_time = Some(entry_time);
        }
    }

    /// Recompute `is_valid` once scanning stops.
    pub(crate) fn finalize(&mut self, complete: bool) {
        self.complete = complete;
        self.is_valid = complete && self.broken_links.is_empty();
    }

    /// Combine two reports from consecutive segments of the same scan.
    pub fn merge(mut self, other: VerificationReport) -> VerificationReport {
        self.total_entries += other.total_entries;
        self.verified_entries += other.verified_entries;
        self.broken_links.extend(other.broken_links);
        self.first_entry_time = match (self.first_entry_time, other.first_entry_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_entry_time = match (self.last_entry_time, other.last_entry_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let complete = self.complete && other.complete;
        self.finalize(complete);
        self
    }

    pub fn summary(&self) -> String {
        if self.is_valid {
            format!(
                "✅ Audit chain valid: {} of {} entries verified",
                self.verified_entries, self.total_entries
            )
        } else if !self.complete {
            format!(
                "❌ Scan incomplete: {} entries scanned, {} break(s) found so far",
                self.total_entries,
                self.broken_links.len()
            )
        } else {
            format!(
                "❌ Audit chain INVALID: {} break(s) across {} entries",
                self.broken_links.len(),
                self.total_entries
            )
        }
    }
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}
