//! SQLite-backed storage for api keys. Inline `sqlx::query_as` calls per
//! struct, matching the teacher's `domains::contacts::data::contact`
//! repository style rather than a generic `Record` abstraction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{ApiKey, ApiKeyRow};
use crate::common::{ApiKeyId, AppError, AppResult};

pub struct ApiKeyRepository {
    pool: SqlitePool,
}

impl ApiKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: ApiKeyId,
        key_fingerprint: &str,
        key_prefix: &str,
        name: &str,
        tier: &str,
        constraints_json: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            INSERT INTO api_keys (
                id, key_fingerprint, key_prefix, name, tier, constraints_json,
                created_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, key_fingerprint, key_prefix, name, tier, constraints_json,
                      created_at, last_used_at, expires_at, revoked_at
            "#,
        )
        .bind(id)
        .bind(key_fingerprint)
        .bind(key_prefix)
        .bind(name)
        .bind(tier)
        .bind(constraints_json)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_model().map_err(AppError::from)
    }

    pub async fn find_by_id(&self, id: ApiKeyId) -> AppResult<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, key_fingerprint, key_prefix, name, tier, constraints_json,
                   created_at, last_used_at, expires_at, revoked_at
            FROM api_keys WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_model().map_err(AppError::from)).transpose()
    }

    /// Looks up a key by the HMAC fingerprint of its raw secret — the only
    /// lookup path authentication uses, so a leaked log line never yields
    /// a usable credential (spec §6).
    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> AppResult<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, key_fingerprint, key_prefix, name, tier, constraints_json,
                   created_at, last_used_at, expires_at, revoked_at
            FROM api_keys WHERE key_fingerprint = ?
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_model().map_err(AppError::from)).transpose()
    }

    pub async fn list(&self) -> AppResult<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, key_fingerprint, key_prefix, name, tier, constraints_json,
                   created_at, last_used_at, expires_at, revoked_at
            FROM api_keys ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_model().map_err(AppError::from))
            .collect()
    }

    pub async fn touch_last_used(&self, id: ApiKeyId, when: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(when)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn revoke(&self, id: ApiKeyId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_constraints(
        &self,
        id: ApiKeyId,
        constraints_json: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE api_keys SET constraints_json = ? WHERE id = ?")
            .bind(constraints_json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
