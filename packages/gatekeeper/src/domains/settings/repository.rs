//! Runtime-overridable key/value settings, plus the "last vacuum"
//! bookmark used by the cleanup worker (spec §3) and at-rest-encrypted
//! secrets (spec §6) sealed with the configured [`SecretCipher`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::common::crypto::SecretCipher;
use crate::common::{AppError, AppResult};

pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value_json FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(json,)| serde_json::from_str(&json).map_err(anyhow::Error::from).map_err(Into::into))
            .transpose()
    }

    pub async fn set(&self, key: &str, value: &serde_json::Value) -> AppResult<()> {
        let json = serde_json::to_string(value).map_err(anyhow::Error::from)?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value_json, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn last_vacuum_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        let value = self.get("last_vacuum_at").await?;
        Ok(value.and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&Utc))))
    }

    pub async fn set_last_vacuum_at(&self, when: DateTime<Utc>) -> AppResult<()> {
        self.set("last_vacuum_at", &serde_json::Value::String(when.to_rfc3339())).await
    }

    /// Seal `plaintext` under `cipher` and persist it at `key`, so the
    /// secret is never written to disk in the clear.
    pub async fn set_encrypted(&self, key: &str, cipher: &SecretCipher, plaintext: &str) -> AppResult<()> {
        let sealed = cipher
            .encrypt(plaintext.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        self.set(key, &serde_json::Value::String(sealed)).await
    }

    /// Recover a secret previously stored with [`Self::set_encrypted`].
    pub async fn get_encrypted(&self, key: &str, cipher: &SecretCipher) -> AppResult<Option<String>> {
        let Some(sealed) = self.get(key).await?.and_then(|v| v.as_str().map(str::to_string)) else {
            return Ok(None);
        };
        let plaintext = cipher
            .decrypt(&sealed)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
    }
}
