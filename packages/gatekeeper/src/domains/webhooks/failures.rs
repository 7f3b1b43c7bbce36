//! Outbound webhook delivery failure tracking and retry-with-backoff
//! (spec §3, §4.9).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::common::{AppResult, RequestId, WebhookFailureId};

pub struct WebhookFailure {
    pub id: WebhookFailureId,
    pub request_id: RequestId,
    pub status: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct WebhookFailureRow {
    id: WebhookFailureId,
    request_id: RequestId,
    status: String,
    payload_json: String,
    error: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl WebhookFailureRow {
    fn into_model(self) -> anyhow::Result<WebhookFailure> {
        Ok(WebhookFailure {
            id: self.id,
            request_id: self.request_id,
            status: self.status,
            payload: serde_json::from_str(&self.payload_json)?,
            error: self.error,
            attempts: self.attempts,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
        })
    }
}

pub struct WebhookFailureRepository {
    pool: SqlitePool,
}

impl WebhookFailureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        request_id: RequestId,
        status: &str,
        payload: &serde_json::Value,
        error: &str,
    ) -> AppResult<WebhookFailureId> {
        let id = WebhookFailureId::new();
        let payload_json = serde_json::to_string(payload).map_err(anyhow::Error::from)?;
        sqlx::query(
            r#"
            INSERT INTO webhook_failures
                (id, request_id, status, payload_json, error, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(id)
        .bind(request_id)
        .bind(status)
        .bind(payload_json)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn due_for_retry(&self, max_attempts: i32) -> AppResult<Vec<WebhookFailure>> {
        let rows = sqlx::query_as::<_, WebhookFailureRow>(
            r#"
            SELECT id, request_id, status, payload_json, error, attempts, created_at, resolved_at
            FROM webhook_failures WHERE resolved_at IS NULL AND attempts < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| r.into_model().map_err(crate::common::AppError::from))
            .collect()
    }

    pub async fn mark_resolved(&self, id: WebhookFailureId) -> AppResult<()> {
        sqlx::query("UPDATE webhook_failures SET resolved_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_retry_attempt(&self, id: WebhookFailureId, error: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE webhook_failures SET attempts = attempts + 1, error = COALESCE(?, error) WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
