//! Append-only audit log model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ApiKeyId, RequestId};

/// Enumerated audit event kinds. New variants should only ever be
/// appended — never renamed — since `details`/`event_type` values are
/// written once and read by operators long after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RequestSubmitted,
    RequestApproved,
    RequestDenied,
    RequestSuggested,
    RequestResubmitted,
    RequestCancelled,
    RequestExpired,
    RequestExecuting,
    RequestCompleted,
    RequestFailed,
    ApiKeyCreated,
    ApiKeyRevoked,
    ApiKeyConstraintsUpdated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RequestSubmitted => "request_submitted",
            AuditEventType::RequestApproved => "request_approved",
            AuditEventType::RequestDenied => "request_denied",
            AuditEventType::RequestSuggested => "request_suggested",
            AuditEventType::RequestResubmitted => "request_resubmitted",
            AuditEventType::RequestCancelled => "request_cancelled",
            AuditEventType::RequestExpired => "request_expired",
            AuditEventType::RequestExecuting => "request_executing",
            AuditEventType::RequestCompleted => "request_completed",
            AuditEventType::RequestFailed => "request_failed",
            AuditEventType::ApiKeyCreated => "api_key_created",
            AuditEventType::ApiKeyRevoked => "api_key_revoked",
            AuditEventType::ApiKeyConstraintsUpdated => "api_key_constraints_updated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub request_id: Option<RequestId>,
    pub api_key_id: Option<ApiKeyId>,
    pub actor: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AuditEntryRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub request_id: Option<RequestId>,
    pub api_key_id: Option<ApiKeyId>,
    pub actor: String,
    pub details_json: String,
    pub ip_address: Option<String>,
}

impl AuditEntryRow {
    pub(crate) fn into_model(self) -> anyhow::Result<AuditEntry> {
        Ok(AuditEntry {
            id: self.id,
            timestamp: self.timestamp,
            event_type: self.event_type,
            request_id: self.request_id,
            api_key_id: self.api_key_id,
            actor: self.actor,
            details: serde_json::from_str(&self.details_json)?,
            ip_address: self.ip_address,
        })
    }
}
