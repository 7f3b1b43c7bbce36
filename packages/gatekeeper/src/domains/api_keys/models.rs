//! ApiKey and KeyConstraints models (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::common::ApiKeyId;
use crate::domains::policy::Operation;

/// JSON-map-friendly form of a per-operation override table. `serde_json`
/// requires map keys to serialize as plain strings, so the constraint is
/// keyed by [`Operation::as_str`] rather than the enum itself.
pub type OperationOverrides = HashMap<String, ActionOverride>;

/// Privilege tier attached to an api key (spec Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Read,
    Write,
    Admin,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Read => "read",
            Tier::Write => "write",
            Tier::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Tier::Read),
            "write" => Ok(Tier::Write),
            "admin" => Ok(Tier::Admin),
            other => Err(anyhow::anyhow!("unknown tier: {other}")),
        }
    }
}

/// Allow / require-approval / deny outcome shared by the tier default table
/// and per-key operation overrides (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOverride {
    Allow,
    RequireApproval,
    Deny,
}

/// Per-key policy constraints (spec §3's `KeyConstraints`). Replaced
/// atomically as a whole (never partially patched).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyConstraints {
    /// Non-empty list enables the allowlist; `"*"` matches any calendar.
    #[serde(default)]
    pub calendar_allowlist: Vec<String>,
    /// Per-operation override, keyed by [`Operation::as_str`].
    #[serde(default)]
    pub operation_overrides: OperationOverrides,
    #[serde(default)]
    pub max_event_duration_minutes: Option<i64>,
    #[serde(default)]
    pub attendee_domain_allowlist: Vec<String>,
    #[serde(default)]
    pub allow_external_attendees: bool,
    #[serde(default)]
    pub max_attendees: Option<i32>,
    #[serde(default)]
    pub block_all_day: bool,
}

impl KeyConstraints {
    pub fn operation_override(&self, op: Operation) -> Option<ActionOverride> {
        self.operation_overrides.get(op.as_str()).copied()
    }
}

/// An authenticated api key, as loaded from storage. Never carries the raw
/// secret — only its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    /// HMAC-SHA256 fingerprint of the raw secret (unique).
    pub key_fingerprint: String,
    /// Short, non-secret prefix of the raw secret for display purposes
    /// (e.g. `sk_write_4f2a…`), never enough to reconstruct the key.
    pub key_prefix: String,
    pub name: String,
    pub tier: Tier,
    pub constraints: Option<KeyConstraints>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// Row shape as stored in SQLite (constraints flattened to a JSON column).
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ApiKeyRow {
    pub id: ApiKeyId,
    pub key_fingerprint: String,
    pub key_prefix: String,
    pub name: String,
    pub tier: String,
    pub constraints_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    pub(crate) fn into_model(self) -> anyhow::Result<ApiKey> {
        let constraints = match self.constraints_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(ApiKey {
            id: self.id,
            key_fingerprint: self.key_fingerprint,
            key_prefix: self.key_prefix,
            name: self.name,
            tier: self.tier.parse()?,
            constraints,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
        })
    }
}
