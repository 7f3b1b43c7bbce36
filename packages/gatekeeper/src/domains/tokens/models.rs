//! Decision token model (spec §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::RequestId;

/// One of the three actions a decision token can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Deny,
    Suggest,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Deny => "deny",
            DecisionAction::Suggest => "suggest",
        }
    }
}

impl std::str::FromStr for DecisionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(DecisionAction::Approve),
            "deny" => Ok(DecisionAction::Deny),
            "suggest" => Ok(DecisionAction::Suggest),
            other => Err(anyhow::anyhow!("unknown decision action: {other}")),
        }
    }
}

/// A single-use capability keyed by the SHA-256 hash of its raw string;
/// the store never sees the raw token itself (spec §4.4).
#[derive(Debug, Clone)]
pub struct DecisionToken {
    pub token_hash: String,
    pub request_id: RequestId,
    pub allowed_actions: Vec<DecisionAction>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_action: Option<DecisionAction>,
}

impl DecisionToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct DecisionTokenRow {
    pub token_hash: String,
    pub request_id: RequestId,
    pub allowed_actions: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_action: Option<String>,
}

impl DecisionTokenRow {
    pub(crate) fn into_model(self) -> anyhow::Result<DecisionToken> {
        let allowed_actions = self
            .allowed_actions
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DecisionToken {
            token_hash: self.token_hash,
            request_id: self.request_id,
            allowed_actions,
            expires_at: self.expires_at,
            consumed_at: self.consumed_at,
            consumed_action: self.consumed_action.map(|a| a.parse()).transpose()?,
        })
    }
}

pub(crate) fn encode_allowed_actions(actions: &[DecisionAction]) -> String {
    actions.iter().map(DecisionAction::as_str).collect::<Vec<_>>().join(",")
}
