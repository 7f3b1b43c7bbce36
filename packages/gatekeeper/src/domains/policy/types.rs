//! Shared types for the policy evaluator (spec §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::api_keys::models::ActionOverride;

/// The three mutation kinds a request can carry (spec §3: `operation ∈
/// {create,update,delete}_event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateEvent => "create_event",
            Operation::UpdateEvent => "update_event",
            Operation::DeleteEvent => "delete_event",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_event" => Ok(Operation::CreateEvent),
            "update_event" => Ok(Operation::UpdateEvent),
            "delete_event" => Ok(Operation::DeleteEvent),
            other => Err(anyhow::anyhow!("unknown operation: {other}")),
        }
    }
}

/// Whether the evaluator could fully resolve the intent's effective
/// fields. For updates, fields the client didn't supply default to the
/// current event's values, fetched from the calendar provider; if that
/// fetch fails the evaluator must fail closed (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldResolution {
    /// All effective fields (attendees/start/end/calendar) are known.
    Resolved,
    /// The upstream fetch needed to resolve missing update fields failed.
    FetchFailed,
}

/// The fully-resolved shape the evaluator reasons over. For creates and
/// deletes this is simply the submitted intent; for updates it is the
/// submitted intent merged over the current event (by the caller, before
/// invoking the evaluator — the evaluator itself never talks to the
/// calendar provider, keeping it a pure function per spec §4.2).
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub operation: Operation,
    pub calendar_id: String,
    pub attendees: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: FieldResolution,
}

impl EvaluationInput {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn is_all_day(&self) -> bool {
        self.duration() >= chrono::Duration::hours(24)
    }
}

/// A failing constraint, carrying a stable name for clients (spec §4.2's
/// "Violation object") and a human message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub constraint: String,
    pub message: String,
}

impl Violation {
    pub fn new(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

/// The evaluator's verdict.
#[derive(Debug, Clone)]
pub enum PolicyDecision {
    Allow,
    RequireApproval,
    Deny(Violation),
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, PolicyDecision::Deny(_))
    }
}

impl From<ActionOverride> for PolicyDecision {
    fn from(value: ActionOverride) -> Self {
        match value {
            ActionOverride::Allow => PolicyDecision::Allow,
            ActionOverride::RequireApproval => PolicyDecision::RequireApproval,
            ActionOverride::Deny => {
                PolicyDecision::Deny(Violation::new("operation_override", "operation is denied by key policy"))
            }
        }
    }
}
