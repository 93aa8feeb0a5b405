use thiserror::Error;

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(format!("JSON serialization error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Append race on partition {partition_key}: tail moved under us after {attempts} attempt(s)")]
    AppendRace {
        partition_key: String,
        attempts: u32,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Fetch error: {0}")]
    Fetch(String),
}

impl AuditError {
    /// True when an append may be retried against a fresh chain tail.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AppendRace { .. })
    }
}
