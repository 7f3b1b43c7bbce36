//! Application configuration loaded from environment variables, mirroring
//! the teacher's `config.rs` shape and `.context(...)`-annotated failures.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Runtime configuration for the gatekeeper process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the embedded SQLite database file (spec §6: "single
    /// relational database file"). `:memory:` is accepted for tests.
    pub database_path: String,
    pub port: u16,

    /// HMAC pepper used to fingerprint api keys (never logged, never
    /// returned to clients).
    pub api_key_pepper: Vec<u8>,
    /// Master secret HKDF derives at-rest encryption keys from.
    pub secret_master_key: Vec<u8>,
    /// Optional secret used to sign outbound webhook payloads
    /// (`X-SchedLock-Signature`, spec §6). Absent means unsigned.
    pub webhook_signing_secret: Option<String>,
    /// Where outbound status webhooks are delivered.
    pub webhook_url: Option<String>,
    /// Base URL this process is externally reachable at, used to build
    /// `approve`/`deny`/`suggest` callback URLs embedded in notifications.
    pub public_base_url: String,

    /// Where pending-approval notifications are posted (spec §4.7), e.g.
    /// a Slack incoming webhook. Distinct from `webhook_url`, which
    /// carries terminal-status callbacks back to the API client.
    pub notification_webhook_url: Option<String>,
    /// SMS notification channel, all four required together or the
    /// provider is simply not registered.
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub twilio_to_number: Option<String>,

    /// Default request lifetime before the timeout worker expires it.
    pub default_request_ttl: Duration,
    /// Timeout worker poll interval (spec §4.6 default: 30s).
    pub timeout_worker_interval: Duration,
    /// Cleanup/retention worker poll interval.
    pub cleanup_worker_interval: Duration,
    /// Webhook retry worker poll interval.
    pub webhook_retry_interval: Duration,
    /// Idempotency mapping retention window (spec §4.8: 24h).
    pub idempotency_retention: Duration,
    /// Per-request deadline for a calendar write (spec §4.5).
    pub calendar_write_timeout: Duration,

    /// Execution queue retry policy (spec §4.5/§4.9).
    pub max_retry_attempts: i32,
    pub retry_backoff_seconds: Vec<u64>,
    pub retryable_status_codes: Vec<u16>,

    /// Tier-configured rate limits (requests/minute) per spec §6.
    pub rate_limit_read_per_minute: u32,
    pub rate_limit_write_per_minute: u32,
    pub rate_limit_admin_per_minute: u32,
    pub rate_limit_burst: u32,
    /// How long a key's rate-limit bucket may sit untouched before the
    /// cleanup worker evicts it (spec §5: "stale buckets are periodically
    /// evicted").
    pub rate_limit_idle_eviction: Duration,
}

impl Config {
    /// Load configuration from environment variables, loading `.env` first
    /// if present (development convenience, same as the teacher).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "schedlock.db".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        let api_key_pepper = env::var("API_KEY_PEPPER")
            .context("API_KEY_PEPPER must be set")?
            .into_bytes();
        let secret_master_key = env::var("SECRET_MASTER_KEY")
            .context("SECRET_MASTER_KEY must be set")?
            .into_bytes();
        let webhook_signing_secret = env::var("WEBHOOK_SIGNING_SECRET").ok();
        let webhook_url = env::var("WEBHOOK_URL").ok();
        let public_base_url =
            env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
        let notification_webhook_url = env::var("NOTIFICATION_WEBHOOK_URL").ok();
        let twilio_account_sid = env::var("TWILIO_ACCOUNT_SID").ok();
        let twilio_auth_token = env::var("TWILIO_AUTH_TOKEN").ok();
        let twilio_from_number = env::var("TWILIO_FROM_NUMBER").ok();
        let twilio_to_number = env::var("TWILIO_TO_NUMBER").ok();

        let default_request_ttl_secs: u64 = env::var("DEFAULT_REQUEST_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .context("DEFAULT_REQUEST_TTL_SECS must be a number")?;

        let max_retry_attempts: i32 = env::var("MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("MAX_RETRY_ATTEMPTS must be a number")?;

        let retry_backoff_seconds = env::var("RETRY_BACKOFF_SECONDS")
            .unwrap_or_else(|_| "5,10,20".to_string())
            .split(',')
            .map(|s| s.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .context("RETRY_BACKOFF_SECONDS must be a comma-separated list of numbers")?;

        let retryable_status_codes = env::var("RETRYABLE_STATUS_CODES")
            .unwrap_or_else(|_| "429,500,502,503".to_string())
            .split(',')
            .map(|s| s.trim().parse::<u16>())
            .collect::<Result<Vec<_>, _>>()
            .context("RETRYABLE_STATUS_CODES must be a comma-separated list of numbers")?;

        Ok(Self {
            database_path,
            port,
            api_key_pepper,
            secret_master_key,
            webhook_signing_secret,
            webhook_url,
            public_base_url,
            notification_webhook_url,
            twilio_account_sid,
            twilio_auth_token,
            twilio_from_number,
            twilio_to_number,
            default_request_ttl: Duration::from_secs(default_request_ttl_secs),
            timeout_worker_interval: Duration::from_secs(
                env_secs("TIMEOUT_WORKER_INTERVAL_SECS", 30)?,
            ),
            cleanup_worker_interval: Duration::from_secs(
                env_secs("CLEANUP_WORKER_INTERVAL_SECS", 300)?,
            ),
            webhook_retry_interval: Duration::from_secs(
                env_secs("WEBHOOK_RETRY_INTERVAL_SECS", 60)?,
            ),
            idempotency_retention: Duration::from_secs(env_secs(
                "IDEMPOTENCY_RETENTION_SECS",
                86_400,
            )?),
            calendar_write_timeout: Duration::from_secs(env_secs(
                "CALENDAR_WRITE_TIMEOUT_SECS",
                15,
            )?),
            max_retry_attempts,
            retry_backoff_seconds,
            retryable_status_codes,
            rate_limit_read_per_minute: env_u32("RATE_LIMIT_READ_PER_MINUTE", 300)?,
            rate_limit_write_per_minute: env_u32("RATE_LIMIT_WRITE_PER_MINUTE", 60)?,
            rate_limit_admin_per_minute: env_u32("RATE_LIMIT_ADMIN_PER_MINUTE", 600)?,
            rate_limit_burst: env_u32("RATE_LIMIT_BURST", 20)?,
            rate_limit_idle_eviction: Duration::from_secs(env_secs(
                "RATE_LIMIT_IDLE_EVICTION_SECS",
                3_600,
            )?),
        })
    }

    /// A config with fixed test-friendly values, used by integration tests
    /// and the admin CLI's dry-run mode (no environment required).
    pub fn for_testing() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            port: 0,
            api_key_pepper: b"test-pepper".to_vec(),
            secret_master_key: b"test-master-key".to_vec(),
            webhook_signing_secret: None,
            webhook_url: None,
            public_base_url: "http://localhost:0".to_string(),
            notification_webhook_url: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            twilio_to_number: None,
            default_request_ttl: Duration::from_secs(86_400),
            timeout_worker_interval: Duration::from_secs(30),
            cleanup_worker_interval: Duration::from_secs(300),
            webhook_retry_interval: Duration::from_secs(60),
            idempotency_retention: Duration::from_secs(86_400),
            calendar_write_timeout: Duration::from_secs(15),
            max_retry_attempts: 3,
            retry_backoff_seconds: vec![5, 10, 20],
            retryable_status_codes: vec![429, 500, 502, 503],
            rate_limit_read_per_minute: 300,
            rate_limit_write_per_minute: 60,
            rate_limit_admin_per_minute: 600,
            rate_limit_burst: 20,
            rate_limit_idle_eviction: Duration::from_secs(3_600),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}
