//! Idempotency mapping: `(api_key_id, client key) -> request_id`,
//! deduplicating client retries within a 24h window (spec §4.8).
//!
//! The mapping is written **after** the request insert succeeds, guarded
//! by a unique index on `(api_key_id, idempotency_key)`. A second writer
//! racing the same pair hits the unique-constraint error, which this
//! repository translates into "load and return the existing mapping"
//! rather than surfacing a raw SQL error (spec §4.3).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::common::{ApiKeyId, AppResult, RequestId};

pub struct IdempotencyRepository {
    pool: SqlitePool,
}

impl IdempotencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, api_key_id: ApiKeyId, key: &str) -> AppResult<Option<RequestId>> {
        let row: Option<(RequestId,)> = sqlx::query_as(
            "SELECT request_id FROM idempotency_entries WHERE api_key_id = ? AND idempotency_key = ?",
        )
        .bind(api_key_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Insert the mapping for a freshly created request. Returns
    /// `Ok(true)` if this call won the race (mapping didn't already
    /// exist), `Ok(false)` if a concurrent submit beat it — the caller
    /// should then look up and return the winner's request instead.
    pub async fn insert_if_absent(
        &self,
        api_key_id: ApiKeyId,
        key: &str,
        request_id: RequestId,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_entries (api_key_id, idempotency_key, request_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (api_key_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(api_key_id)
        .bind(key)
        .bind(request_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_entries WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
