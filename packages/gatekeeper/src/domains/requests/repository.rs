//! Request repository: typed CRUD with status-guarded updates (spec §4.3).
//! Every transition is a single conditional `UPDATE … WHERE status = ?`
//! statement — the atomic primitive spec §4.1/§5 requires to resolve
//! races between humans, the timeout worker, and the execution queue.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{Intent, Request, RequestRow};
use super::state_machine::RequestStatus;
use crate::common::{ApiKeyId, AppError, AppResult, RequestId};

pub struct RequestRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, api_key_id, operation, status, payload_json, result_json, error,
    suggestion_text, suggestion_by, suggestion_at, created_at, expires_at,
    decided_at, decided_by, executed_at, retry_count, webhook_notified_at
"#;

impl RequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new request in `pending_approval`. The caller (the
    /// engine) picks the id up front so it can mint the paired decision
    /// token and idempotency mapping in the same logical submit.
    pub async fn create(
        &self,
        id: RequestId,
        api_key_id: ApiKeyId,
        intent: &Intent,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Request> {
        let payload_json = serde_json::to_string(intent).map_err(anyhow::Error::from)?;
        let query = format!(
            r#"
            INSERT INTO requests (
                id, api_key_id, operation, status, payload_json,
                created_at, expires_at, retry_count
            )
            VALUES (?, ?, ?, 'pending_approval', ?, ?, ?, 0)
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RequestRow>(&query)
            .bind(id)
            .bind(api_key_id)
            .bind(intent.operation().as_str())
            .bind(payload_json)
            .bind(Utc::now())
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?;

        row.into_model().map_err(AppError::from)
    }

    pub async fn find_by_id(&self, id: RequestId) -> AppResult<Option<Request>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM requests WHERE id = ?");
        let row = sqlx::query_as::<_, RequestRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_model().map_err(AppError::from)).transpose()
    }

    pub async fn list_by_key(
        &self,
        api_key_id: ApiKeyId,
        limit: i64,
        before: Option<(DateTime<Utc>, uuid::Uuid)>,
    ) -> AppResult<Vec<Request>> {
        let rows = if let Some((created_at, id)) = before {
            let query = format!(
                r#"SELECT {SELECT_COLUMNS} FROM requests
                   WHERE api_key_id = ? AND (created_at, id) < (?, ?)
                   ORDER BY created_at DESC, id DESC LIMIT ?"#
            );
            sqlx::query_as::<_, RequestRow>(&query)
                .bind(api_key_id)
                .bind(created_at)
                .bind(id.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let query = format!(
                r#"SELECT {SELECT_COLUMNS} FROM requests
                   WHERE api_key_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"#
            );
            sqlx::query_as::<_, RequestRow>(&query)
                .bind(api_key_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }

    /// The conditional transition primitive every other method builds on.
    /// Returns `true` iff exactly one row changed.
    pub async fn update_status(
        &self,
        id: RequestId,
        new: RequestStatus,
        expected: RequestStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE requests SET status = ? WHERE id = ? AND status = ?")
            .bind(new.as_str())
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// approve/deny, guarded to fire from either decidable status and to
    /// stamp `decided_at`/`decided_by` exactly once (spec §3 invariant).
    pub async fn decide(
        &self,
        id: RequestId,
        new: RequestStatus,
        decided_by: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = ?, decided_at = ?, decided_by = ?
            WHERE id = ? AND status IN ('pending_approval', 'change_requested')
            "#,
        )
        .bind(new.as_str())
        .bind(Utc::now())
        .bind(decided_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// suggest: `pending_approval → change_requested`, recording the
    /// suggestion triple. `change_requested` itself is not re-enterable
    /// by another suggest without first moving back to pending via resubmit.
    pub async fn set_suggestion(&self, id: RequestId, text: &str, by: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'change_requested', decided_at = ?, decided_by = ?,
                suggestion_text = ?, suggestion_by = ?, suggestion_at = ?
            WHERE id = ? AND status = 'pending_approval'
            "#,
        )
        .bind(Utc::now())
        .bind(by)
        .bind(text)
        .bind(by)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Resubmit a `change_requested` request with an edited payload,
    /// looping back to `pending_approval` under the same id (spec §4.1).
    pub async fn resubmit(&self, id: RequestId, intent: &Intent, expires_at: DateTime<Utc>) -> AppResult<bool> {
        let payload_json = serde_json::to_string(intent).map_err(anyhow::Error::from)?;
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'pending_approval', payload_json = ?, operation = ?,
                expires_at = ?, decided_at = NULL, decided_by = NULL,
                suggestion_text = NULL, suggestion_by = NULL, suggestion_at = NULL
            WHERE id = ? AND status = 'change_requested'
            "#,
        )
        .bind(payload_json)
        .bind(intent.operation().as_str())
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_executing(&self, id: RequestId) -> AppResult<bool> {
        self.update_status(id, RequestStatus::Executing, RequestStatus::Approved).await
    }

    pub async fn set_result(&self, id: RequestId, result: &serde_json::Value) -> AppResult<bool> {
        let result_json = serde_json::to_string(result).map_err(anyhow::Error::from)?;
        let updated = sqlx::query(
            r#"
            UPDATE requests SET status = 'completed', result_json = ?, executed_at = ?
            WHERE id = ? AND status = 'executing'
            "#,
        )
        .bind(result_json)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    pub async fn set_error(&self, id: RequestId, error: &str) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE requests SET status = 'failed', error = ? WHERE id = ? AND status = 'executing'",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// The retry path (spec §4.5): increment the counter and drop back to
    /// `approved` so the queue re-enqueues it, all in one statement to
    /// avoid the window spec §9 flags between increment and re-enqueue.
    pub async fn increment_retry_and_requeue(&self, id: RequestId) -> AppResult<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE requests SET status = 'approved', retry_count = retry_count + 1
            WHERE id = ? AND status = 'executing'
            RETURNING retry_count
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(count,)| count))
    }

    pub async fn set_webhook_notified(&self, id: RequestId) -> AppResult<()> {
        sqlx::query("UPDATE requests SET webhook_notified_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending (or, per the explicit Open-Question resolution,
    /// change-requested) rows whose deadline has passed.
    pub async fn get_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<Request>> {
        let query = format!(
            r#"SELECT {SELECT_COLUMNS} FROM requests
               WHERE status IN ('pending_approval', 'change_requested') AND expires_at < ?"#
        );
        let rows = sqlx::query_as::<_, RequestRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }

    /// Rows left `approved` by a process that died between enqueue and
    /// dispatch — the startup reconciliation pass spec §9 calls for.
    pub async fn get_approved(&self) -> AppResult<Vec<Request>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM requests WHERE status = 'approved'");
        let rows = sqlx::query_as::<_, RequestRow>(&query).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }

    pub async fn cancel(&self, id: RequestId, owning_key_id: ApiKeyId) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests SET status = 'cancelled', decided_at = ?, decided_by = 'owner'
            WHERE id = ? AND api_key_id = ? AND status = 'pending_approval'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .bind(owning_key_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cross-key listing for operator tooling (spec §6's admin-scoped
    /// `GET /api/requests/{id}`, generalized to a list view); optionally
    /// narrowed to a single status.
    pub async fn list_recent(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
    ) -> AppResult<Vec<Request>> {
        let rows = if let Some(status) = status {
            let query = format!(
                r#"SELECT {SELECT_COLUMNS} FROM requests
                   WHERE status = ? ORDER BY created_at DESC LIMIT ?"#
            );
            sqlx::query_as::<_, RequestRow>(&query)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let query = format!(
                r#"SELECT {SELECT_COLUMNS} FROM requests ORDER BY created_at DESC LIMIT ?"#
            );
            sqlx::query_as::<_, RequestRow>(&query)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }

    /// Retention cleanup: delete terminal rows older than the cutoff.
    pub async fn delete_terminal_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM requests
            WHERE status IN ('completed', 'failed', 'denied', 'expired', 'cancelled')
              AND created_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
