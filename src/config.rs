use std::env;

use crate::audit::hasher::IntegrityKey;
use crate::error::AuditError;

/// Default number of entries fetched per verifier batch.
pub const DEFAULT_VERIFY_BATCH_SIZE: usize = 500;

/// Default number of append retries after losing a tail race.
pub const DEFAULT_APPEND_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub database_url: String,
    pub integrity_key: IntegrityKey,
    pub verify_batch_size: usize,
    pub append_retries: u32,
}

impl AuditConfig {
    /// Load configuration from the environment.
    ///
    /// The integrity key is mandatory: both the writer and the verifier are
    /// useless without it, so a missing or undersized key fails startup
    /// instead of being silently skipped.
    pub fn load() -> Result<Self, AuditError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://audit.db".to_string());

        let key_hex = env::var("AUDIT_INTEGRITY_KEY").map_err(|_| {
            AuditError::Config(
                "AUDIT_INTEGRITY_KEY is not set; refusing to start without an integrity key"
                    .to_string(),
            )
        })?;
        let integrity_key = IntegrityKey::from_hex(&key_hex)?;

        let verify_batch_size = match env::var("AUDIT_VERIFY_BATCH_SIZE") {
            Ok(v) => v.parse().map_err(|_| {
                AuditError::Config(format!("AUDIT_VERIFY_BATCH_SIZE is not a number: {}", v))
            })?,
            Err(_) => DEFAULT_VERIFY_BATCH_SIZE,
        };
        if verify_batch_size == 0 {
            return Err(AuditError::Config(
                "AUDIT_VERIFY_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        let append_retries = match env::var("AUDIT_APPEND_RETRIES") {
            Ok(v) => v.parse().map_err(|_| {
                AuditError::Config(format!("AUDIT_APPEND_RETRIES is not a number: {}", v))
            })?,
            Err(_) => DEFAULT_APPEND_RETRIES,
        };

        Ok(AuditConfig {
            database_url,
            integrity_key,
            verify_batch_size,
            append_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_fatal() {
        // Serialize access to the process environment across config tests.
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("AUDIT_INTEGRITY_KEY");

        let result = AuditConfig::load();
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    #[test]
    fn test_load_with_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AUDIT_INTEGRITY_KEY", "11".repeat(32));
        env::remove_var("AUDIT_VERIFY_BATCH_SIZE");
        env::remove_var("AUDIT_APPEND_RETRIES");

        let config = AuditConfig::load().unwrap();
        assert_eq!(config.verify_batch_size, DEFAULT_VERIFY_BATCH_SIZE);
        assert_eq!(config.append_retries, DEFAULT_APPEND_RETRIES);

        env::remove_var("AUDIT_INTEGRITY_KEY");
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
}
