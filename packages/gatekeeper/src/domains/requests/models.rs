//! Request and intent models (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::RequestStatus;
use crate::common::{ApiKeyId, RequestId};
use crate::domains::policy::Operation;

/// The statically typed, unknown-fields-rejected mutation payload a
/// request wraps (spec §9: prefer explicit schema over the source's
/// "unknown fields silently ignored" policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", deny_unknown_fields)]
pub enum Intent {
    CreateEvent(CreateEventIntent),
    UpdateEvent(UpdateEventIntent),
    DeleteEvent(DeleteEventIntent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventIntent {
    pub calendar_id: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// PATCH semantics: only the fields present change; the rest default to
/// the current event's values, resolved by the engine before evaluation
/// (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventIntent {
    pub calendar_id: String,
    pub event_id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteEventIntent {
    pub calendar_id: String,
    pub event_id: String,
}

impl Intent {
    pub fn operation(&self) -> Operation {
        match self {
            Intent::CreateEvent(_) => Operation::CreateEvent,
            Intent::UpdateEvent(_) => Operation::UpdateEvent,
            Intent::DeleteEvent(_) => Operation::DeleteEvent,
        }
    }

    pub fn calendar_id(&self) -> &str {
        match self {
            Intent::CreateEvent(i) => &i.calendar_id,
            Intent::UpdateEvent(i) => &i.calendar_id,
            Intent::DeleteEvent(i) => &i.calendar_id,
        }
    }
}

/// A human-authored change request attached to a `change_requested`
/// request (spec Glossary: "Suggestion").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub api_key_id: ApiKeyId,
    pub operation: Operation,
    pub status: RequestStatus,
    pub payload: Intent,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub suggestion: Option<Suggestion>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub webhook_notified_at: Option<DateTime<Utc>>,
}

/// Row shape as stored in SQLite; intent/result/suggestion are flattened
/// JSON text columns, matching the `ApiKeyRow`/`constraints_json` pattern.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RequestRow {
    pub id: RequestId,
    pub api_key_id: ApiKeyId,
    pub operation: String,
    pub status: String,
    pub payload_json: String,
    pub result_json: Option<String>,
    pub error: Option<String>,
    pub suggestion_text: Option<String>,
    pub suggestion_by: Option<String>,
    pub suggestion_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub webhook_notified_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    pub(crate) fn into_model(self) -> anyhow::Result<Request> {
        let suggestion = match (self.suggestion_text, self.suggestion_by, self.suggestion_at) {
            (Some(text), Some(by), Some(at)) => Some(Suggestion { text, by, at }),
            _ => None,
        };
        Ok(Request {
            id: self.id,
            api_key_id: self.api_key_id,
            operation: self.operation.parse()?,
            status: self.status.parse()?,
            payload: serde_json::from_str(&self.payload_json)?,
            result: self.result_json.map(|r| serde_json::from_str(&r)).transpose()?,
            error: self.error,
            suggestion,
            created_at: self.created_at,
            expires_at: self.expires_at,
            decided_at: self.decided_at,
            decided_by: self.decided_by,
            executed_at: self.executed_at,
            retry_count: self.retry_count,
            webhook_notified_at: self.webhook_notified_at,
        })
    }
}
