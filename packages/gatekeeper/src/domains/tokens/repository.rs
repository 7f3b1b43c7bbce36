//! Decision token repository: create / validate / atomically consume
//! (spec §4.4). Validation never mutates state; only `consume` does, and
//! it does so with the single conditional update that makes at-most-once
//! consumption hold under concurrent callback races (spec §8 invariant 3/4).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{encode_allowed_actions, DecisionAction, DecisionToken, DecisionTokenRow};
use crate::common::crypto::{hash_token, mint_decision_token, MintedToken};
use crate::common::{AppError, AppResult, RequestId};

pub enum ConsumeOutcome {
    Consumed(RequestId),
    NotFound,
    Expired,
    AlreadyConsumed,
    ActionNotAllowed,
}

pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mint a fresh token for `request_id`, scoped to `allowed_actions`,
    /// expiring alongside the request. Returns the raw string — the only
    /// time it ever exists outside the caller's hands.
    pub async fn mint(
        &self,
        request_id: RequestId,
        allowed_actions: &[DecisionAction],
        expires_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let MintedToken { raw, hash } = mint_decision_token();
        sqlx::query(
            r#"
            INSERT INTO decision_tokens (token_hash, request_id, allowed_actions, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&hash)
        .bind(request_id)
        .bind(encode_allowed_actions(allowed_actions))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(raw)
    }

    /// Look up a presented token without any side effect — used to render
    /// an approval confirmation page before the human commits to an action.
    pub async fn validate(&self, raw_token: &str) -> AppResult<Option<DecisionToken>> {
        let hash = hash_token(raw_token);
        let row = sqlx::query_as::<_, DecisionTokenRow>(
            r#"
            SELECT token_hash, request_id, allowed_actions, expires_at, consumed_at, consumed_action
            FROM decision_tokens WHERE token_hash = ?
            "#,
        )
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_model().map_err(AppError::from)).transpose()
    }

    /// Atomically consume a token for `action`. This is the single
    /// authorization + side-effect boundary: exactly one concurrent
    /// caller observes `rows_affected() > 0`.
    pub async fn consume(&self, raw_token: &str, action: DecisionAction) -> AppResult<ConsumeOutcome> {
        let Some(token) = self.validate(raw_token).await? else {
            return Ok(ConsumeOutcome::NotFound);
        };
        if token.expires_at <= Utc::now() {
            return Ok(ConsumeOutcome::Expired);
        }
        if token.consumed_at.is_some() {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }
        if !token.allowed_actions.contains(&action) {
            return Ok(ConsumeOutcome::ActionNotAllowed);
        }

        let result = sqlx::query(
            r#"
            UPDATE decision_tokens SET consumed_at = ?, consumed_action = ?
            WHERE token_hash = ? AND consumed_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(action.as_str())
        .bind(&token.token_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(ConsumeOutcome::Consumed(token.request_id))
        } else {
            // Lost the race to a concurrent consumer between validate and
            // the conditional update above.
            Ok(ConsumeOutcome::AlreadyConsumed)
        }
    }

    /// Delete tokens whose request expired beyond the retention window,
    /// run by the cleanup worker alongside idempotency-mapping eviction.
    pub async fn delete_expired_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM decision_tokens WHERE expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
