//! Notification log: one row per delivery attempt, updated once on
//! callback match (spec §3, §4.7).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::common::{AppResult, NotificationLogEntryId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
    CallbackReceived,
}

impl NotificationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::CallbackReceived => "callback_received",
        }
    }
}

pub struct NotificationLogRepository {
    pool: SqlitePool,
}

impl NotificationLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_attempt(
        &self,
        id: NotificationLogEntryId,
        request_id: RequestId,
        provider: &str,
        status: NotificationStatus,
        provider_message_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_log
                (id, request_id, provider, status, provider_message_id, sent_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(request_id)
        .bind(provider)
        .bind(status.as_str())
        .bind(provider_message_id)
        .bind(Utc::now())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Correlates an inbound provider callback by (provider, message id)
    /// where the provider supplies one.
    pub async fn record_callback(&self, provider: &str, provider_message_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notification_log SET status = 'callback_received', callback_at = ?
            WHERE provider = ? AND provider_message_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(provider)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
