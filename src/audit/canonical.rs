//! Canonical Encoder
//!
//! Deterministic byte encoding of an entry's content fields, used as the
//! hashing input for the chain digest. The encoding must be a pure,
//! order-stable function of the logical content: identical content always
//! encodes identically, and any change to any included field changes the
//! output.
//!
//! Byte layout, in order:
//!   1. schema version (1 byte)
//!   2. id as UTF-8 of its hyphenated form, length-prefixed
//!   3. partition_key, length-prefixed
//!   4. actor kind + actor id, each length-prefixed
//!   5. action, length-prefixed
//!   6. resource_type, resource_id, length-prefixed
//!   7. sensitivity, length-prefixed
//!   8. description, length-prefixed
//!   9. metadata as compact JSON, length-prefixed (serde_json keeps object
//!      keys sorted, so logically equal metadata encodes identically)
//!  10. actor_network_address: presence byte, then length-prefixed if present
//!  11. created_at as RFC 3339 UTC with fixed microsecond precision,
//!      length-prefixed
//!  12. previous_digest: presence byte, then length-prefixed if present
//!
//! Every variable-length field carries a u32 little-endian length prefix, so
//! no concatenation of adjacent fields can collide with another split of the
//! same bytes.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::audit::entry::AuditEntry;
use crate::error::AuditError;

/// Version of the canonical layout. Any change to the set of hashed fields
/// or their encoding must bump this.
pub const CANONICAL_SCHEMA_VERSION: u8 = 1;

/// Normalize a timestamp to the exact string form that is hashed and stored.
///
/// Fixed microsecond precision and a trailing `Z` keep the representation
/// exact across write, storage, and re-read, so serialization drift can never
/// surface as a false chain break. The fixed width also makes lexicographic
/// order chronological, which the store's scan index relies on.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond precision so an entry's in-memory timestamp equals
/// its canonical form exactly. The writer applies this before hashing;
/// otherwise a nanosecond-resolution clock would hash one value and store
/// another.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let extra_nanos = i64::from(ts.timestamp_subsec_nanos() % 1_000);
    ts - chrono::Duration::nanoseconds(extra_nanos)
}

/// Encode an entry's content fields (everything except `current_digest`)
/// into the canonical hashing input.
pub fn canonical_bytes(entry: &AuditEntry) -> Result<Vec<u8>, AuditError> {
    let metadata = serde_json::to_vec(&entry.metadata).map_err(|e| {
        AuditError::Encoding(format!(
            "metadata for entry {} cannot be canonicalized: {}",
            entry.id, e
        ))
    })?;

    let mut out = Vec::with_capacity(256 + metadata.len());
    out.push(CANONICAL_SCHEMA_VERSION);

    push_field(&mut out, entry.id.hyphenated().to_string().as_bytes());
    push_field(&mut out, entry.partition_key.as_bytes());
    push_field(&mut out, entry.actor.kind().as_bytes());
    push_field(&mut out, entry.actor.id().as_bytes());
    push_field(&mut out, entry.action.as_str().as_bytes());
    push_field(&mut out, entry.resource_type.as_bytes());
    push_field(&mut out, entry.resource_id.as_bytes());
    push_field(&mut out, entry.sensitivity.as_str().as_bytes());
    push_field(&mut out, entry.description.as_bytes());
    push_field(&mut out, &metadata);
    push_optional(&mut out, entry.actor_network_address.as_deref());
    push_field(&mut out, canonical_timestamp(&entry.created_at).as_bytes());
    push_optional(&mut out, entry.previous_digest.as_deref());

    Ok(out)
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

// Absent and empty must encode differently.
fn push_optional(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(v) => {
            out.push(1);
            push_field(out, v.as_bytes());
        }
        None => out.push(0),
    }
}
