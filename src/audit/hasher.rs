//! Chain Hasher
//!
//! Keyed digest over an entry's canonical encoding. HMAC-SHA256 with a
//! secret integrity key held outside the data store: an attacker who can
//! rewrite rows but does not hold the key cannot forge a digest that
//! verifies.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::audit::canonical::canonical_bytes;
use crate::audit::entry::AuditEntry;
use crate::error::AuditError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum key length in bytes. HMAC-SHA256 keys shorter than the output
/// size weaken the construction.
pub const MIN_KEY_BYTES: usize = 32;

/// The secret integrity key. Loaded once at startup from configuration;
/// read-only for the life of the process.
#[derive(Clone)]
pub struct IntegrityKey(Vec<u8>);

impl IntegrityKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, AuditError> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(AuditError::Config(format!(
                "integrity key is {} bytes, minimum is {}",
                bytes.len(),
                MIN_KEY_BYTES
            )));
        }
        Ok(IntegrityKey(bytes))
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, AuditError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| AuditError::Config(format!("integrity key is not valid hex: {}", e)))?;
        Self::new(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// The key must never leak through Debug output or logs.
impl std::fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IntegrityKey").field(&"[REDACTED]").finish()
    }
}

/// Pure keyed hash over canonical entry bytes.
#[derive(Debug, Clone)]
pub struct ChainHasher {
    key: IntegrityKey,
}

impl ChainHasher {
    pub fn new(key: IntegrityKey) -> Self {
        ChainHasher { key }
    }

    /// Digest raw canonical bytes. Lowercase 64-char hex.
    pub fn digest_bytes(&self, canonical: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Encode an entry's content (including its `previous_digest`) and
    /// digest it. This is the one function both the writer and the verifier
    /// use, so a digest that verifies is exactly a digest the writer could
    /// have produced.
    pub fn digest_entry(&self, entry: &AuditEntry) -> Result<String, AuditError> {
        Ok(self.digest_bytes(&canonical_bytes(entry)?))
    }
}
