//! SQLite-backed entry store
//!
//! Durable storage over a sqlx pool. Two invariants live in the schema
//! rather than in application code so they hold across processes:
//!
//! - a UNIQUE index on `(partition_key, previous_digest)` means a chain tail
//!   can only ever be extended once — a racing writer loses at commit;
//! - `previous_digest` is `TEXT NOT NULL` with `''` as the "no predecessor"
//!   sentinel, because SQLite treats NULLs as distinct in unique indexes and
//!   the genesis slot must be unique too.
//!
//! Timestamps are stored as fixed-precision RFC 3339 text (see
//! [`canonical_timestamp`]), so lexicographic `ORDER BY` is chronological
//! and the value round-trips exactly into the hash input.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::audit::canonical::canonical_timestamp;
use crate::audit::entry::{Actor, AuditAction, AuditEntry, SensitivityLevel};
use crate::error::AuditError;
use crate::store::{ChainTail, Cursor, EntryStore, VerifyScope};

const SELECT_COLUMNS: &str = "id, partition_key, actor_kind, actor_id, action, resource_type, \
     resource_id, sensitivity, description, metadata, actor_network_address, created_at, \
     previous_digest, current_digest";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AuditError::Config(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = SqliteStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AuditError::Config(format!("Invalid database URL: {}", e)))?;

        // Each pool connection would otherwise get its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(include_str!("../../migrations/001_audit_entries.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Raw pool access. Tests use this to tamper with committed rows the
    /// way an attacker with database access would.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<AuditEntry, AuditError> {
    let bad = |field: &str, detail: String| {
        AuditError::Fetch(format!("unreadable {} in stored entry: {}", field, detail))
    };

    let id: String = row.get("id");
    let id = Uuid::parse_str(&id).map_err(|e| bad("id", e.to_string()))?;

    let actor_kind: String = row.get("actor_kind");
    let actor_id: String = row.get("actor_id");
    let actor = match actor_kind.as_str() {
        "system" => Actor::System(actor_id),
        "user" => Actor::User(actor_id),
        "resident" => Actor::Resident(actor_id),
        other => return Err(bad("actor_kind", other.to_string())),
    };

    let action: String = row.get("action");
    let action =
        AuditAction::parse(&action).ok_or_else(|| bad("action", action.clone()))?;

    let sensitivity: String = row.get("sensitivity");
    let sensitivity = SensitivityLevel::parse(&sensitivity)
        .ok_or_else(|| bad("sensitivity", sensitivity.clone()))?;

    let metadata: String = row.get("metadata");
    let metadata =
        serde_json::from_str(&metadata).map_err(|e| bad("metadata", e.to_string()))?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| bad("created_at", e.to_string()))?
        .with_timezone(&Utc);

    let previous_digest: String = row.get("previous_digest");
    let previous_digest = if previous_digest.is_empty() {
        None
    } else {
        Some(previous_digest)
    };

    Ok(AuditEntry {
        id,
        partition_key: row.get("partition_key"),
        actor,
        action,
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        sensitivity,
        description: row.get("description"),
        metadata,
        actor_network_address: row.get("actor_network_address"),
        created_at,
        previous_digest,
        current_digest: row.get("current_digest"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
        .unwrap_or(false)
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn chain_tail(&self, partition_key: &str) -> Result<Option<ChainTail>, AuditError> {
        let row = sqlx::query(
            "SELECT current_digest, created_at FROM audit_entries \
             WHERE partition_key = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(partition_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let created_at: String = row.get("created_at");
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| {
                        AuditError::Storage(format!("unreadable tail timestamp: {}", e))
                    })?
                    .with_timezone(&Utc);
                Ok(Some(ChainTail {
                    digest: row.get("current_digest"),
                    created_at,
                }))
            }
        }
    }

    async fn insert_entry(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut tx = self.pool.begin().await?;

        // Re-check the tail inside the transaction; the in-process partition
        // lock normally prevents a mismatch, this guards other processes.
        let tail: Option<String> = sqlx::query_scalar(
            "SELECT current_digest FROM audit_entries \
             WHERE partition_key = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(&entry.partition_key)
        .fetch_optional(&mut *tx)
        .await?;

        if tail.as_deref() != entry.previous_digest.as_deref() {
            return Err(AuditError::AppendRace {
                partition_key: entry.partition_key.clone(),
                attempts: 1,
            });
        }

        let metadata = serde_json::to_string(&entry.metadata)?;
        let result = sqlx::query(
            "INSERT INTO audit_entries (id, partition_key, actor_kind, actor_id, action, \
             resource_type, resource_id, sensitivity, description, metadata, \
             actor_network_address, created_at, previous_digest, current_digest) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.hyphenated().to_string())
        .bind(&entry.partition_key)
        .bind(entry.actor.kind())
        .bind(entry.actor.id())
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.sensitivity.as_str())
        .bind(&entry.description)
        .bind(metadata)
        .bind(&entry.actor_network_address)
        .bind(canonical_timestamp(&entry.created_at))
        .bind(entry.previous_digest.as_deref().unwrap_or(""))
        .bind(&entry.current_digest)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(AuditError::AppendRace {
                partition_key: entry.partition_key.clone(),
                attempts: 1,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_batch(
        &self,
        scope: &VerifyScope,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM audit_entries WHERE 1=1", SELECT_COLUMNS));

        if let Some(partition) = &scope.partition_key {
            qb.push(" AND partition_key = ").push_bind(partition);
        }
        if let Some(from) = &scope.from {
            qb.push(" AND created_at >= ").push_bind(canonical_timestamp(from));
        }
        if let Some(to) = &scope.to {
            qb.push(" AND created_at < ").push_bind(canonical_timestamp(to));
        }
        if let Some(cursor) = cursor {
            qb.push(" AND (partition_key, created_at, id) > (")
                .push_bind(&cursor.partition_key)
                .push(", ")
                .push_bind(canonical_timestamp(&cursor.created_at))
                .push(", ")
                .push_bind(cursor.id.hyphenated().to_string())
                .push(")");
        }
        qb.push(" ORDER BY partition_key, created_at, id LIMIT ")
            .push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuditError::Fetch(format!("batch fetch failed: {}", e)))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn entry_before(
        &self,
        partition_key: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM audit_entries WHERE partition_key = ? AND created_at < ? \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(partition_key)
        .bind(canonical_timestamp(&before))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::Fetch(format!("anchor fetch failed: {}", e)))?;

        row.as_ref().map(row_to_entry).transpose()
    }
}
