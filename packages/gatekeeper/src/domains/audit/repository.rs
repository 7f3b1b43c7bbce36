//! Audit repository: append-only writes, filtered reads for request
//! detail views and operator tooling.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use super::models::{AuditEntry, AuditEntryRow, AuditEventType};
use crate::common::{ApiKeyId, AppError, AppResult, RequestId};

pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        event_type: AuditEventType,
        request_id: Option<RequestId>,
        api_key_id: Option<ApiKeyId>,
        actor: &str,
        details: &Value,
        ip_address: Option<&str>,
    ) -> AppResult<()> {
        let details_json = serde_json::to_string(details).map_err(anyhow::Error::from)?;
        sqlx::query(
            r#"
            INSERT INTO audit_entries (timestamp, event_type, request_id, api_key_id, actor, details_json, ip_address)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now())
        .bind(event_type.as_str())
        .bind(request_id)
        .bind(api_key_id)
        .bind(actor)
        .bind(details_json)
        .bind(ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_request(&self, request_id: RequestId) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT id, timestamp, event_type, request_id, api_key_id, actor, details_json, ip_address
            FROM audit_entries WHERE request_id = ? ORDER BY timestamp ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }

    /// Most-recent-first tail, used by operator tooling (`gatekeeper-admin
    /// audit tail`).
    pub async fn recent(&self, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT id, timestamp, event_type, request_id, api_key_id, actor, details_json, ip_address
            FROM audit_entries ORDER BY timestamp DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_model().map_err(AppError::from)).collect()
    }
}
