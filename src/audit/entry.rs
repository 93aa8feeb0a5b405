//! Audit Log Entry
//!
//! Defines the immutable, hash-chained audit entry and its field vocabulary.
//! Every sensitive action in the platform is recorded as one of these; once
//! committed an entry is never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed the audited action. Exactly one identifier, never both a
/// user and a resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Internal job or service, identified by its service name.
    System(String),
    /// Authenticated staff user.
    User(String),
    /// Authenticated resident (end customer).
    Resident(String),
}

impl Actor {
    pub fn kind(&self) -> &'static str {
        match self {
            Actor::System(_) => "system",
            Actor::User(_) => "user",
            Actor::Resident(_) => "resident",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Actor::System(id) | Actor::User(id) | Actor::Resident(id) => id,
        }
    }
}

/// Fixed vocabulary of audited verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Disclose,
    ConsentGrant,
    ConsentRevoke,
    PaymentCapture,
    PaymentRefund,
    Export,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Read => "read",
            AuditAction::Update => "update",
            AuditAction::Disclose => "disclose",
            AuditAction::ConsentGrant => "consent_grant",
            AuditAction::ConsentRevoke => "consent_revoke",
            AuditAction::PaymentCapture => "payment_capture",
            AuditAction::PaymentRefund => "payment_refund",
            AuditAction::Export => "export",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create" => AuditAction::Create,
            "read" => AuditAction::Read,
            "update" => AuditAction::Update,
            "disclose" => AuditAction::Disclose,
            "consent_grant" => AuditAction::ConsentGrant,
            "consent_revoke" => AuditAction::ConsentRevoke,
            "payment_capture" => AuditAction::PaymentCapture,
            "payment_refund" => AuditAction::PaymentRefund,
            "export" => AuditAction::Export,
            _ => return None,
        })
    }
}

/// Ordered sensitivity classification. `Protected` marks legally sensitive
/// disclosures that must never be deleted, only appended-around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    Public,
    Internal,
    Confidential,
    Protected,
}

impl SensitivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityLevel::Public => "public",
            SensitivityLevel::Internal => "internal",
            SensitivityLevel::Confidential => "confidential",
            SensitivityLevel::Protected => "protected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "public" => SensitivityLevel::Public,
            "internal" => SensitivityLevel::Internal,
            "confidential" => SensitivityLevel::Confidential,
            "protected" => SensitivityLevel::Protected,
            _ => return None,
        })
    }
}

/// A committed audit entry. `previous_digest` is `None` only for the first
/// entry of a partition; `current_digest` is always derived by the writer,
/// never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub partition_key: String,
    pub actor: Actor,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub sensitivity: SensitivityLevel,
    /// Free text. Must reference the sensitive payload, never contain it.
    pub description: String,
    pub metadata: serde_json::Value,
    pub actor_network_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub previous_digest: Option<String>,
    pub current_digest: String,
}

/// Everything a caller supplies for one append. The writer assigns `id`,
/// `created_at` and both digests.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub partition_key: String,
    pub actor: Actor,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub sensitivity: SensitivityLevel,
    pub description: String,
    pub metadata: serde_json::Value,
    pub actor_network_address: Option<String>,
}
