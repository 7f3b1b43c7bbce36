//! Process entry point for the gatekeeper HTTP server (spec §6): loads
//! configuration, opens the SQLite pool, runs migrations, wires every
//! repository and background worker, then serves until signalled.

use std::sync::Arc;

use anyhow::{Context, Result};
use gatekeeper_core::common::crypto::SecretCipher;
use gatekeeper_core::config::Config;
use gatekeeper_core::domains::api_keys::ApiKeyRepository;
use gatekeeper_core::domains::audit::AuditRepository;
use gatekeeper_core::domains::idempotency::IdempotencyRepository;
use gatekeeper_core::domains::notifications::{NotificationLogRepository, NotificationManager};
use gatekeeper_core::domains::requests::RequestRepository;
use gatekeeper_core::domains::settings::SettingsRepository;
use gatekeeper_core::domains::tokens::TokenRepository;
use gatekeeper_core::domains::webhooks::{OutboundWebhookClient, WebhookFailureRepository};
use gatekeeper_core::engine::{Engine, EngineSettings};
use gatekeeper_core::http::{self, AppState};
use gatekeeper_core::kernel::calendar_client::testing::NullCalendar;
use gatekeeper_core::kernel::cleanup_worker::CleanupWorker;
use gatekeeper_core::kernel::queue::{ExecutionQueue, QueueWorker, RetryPolicy};
use gatekeeper_core::kernel::rate_limiter::{RateLimitConfig, RateLimiter};
use gatekeeper_core::kernel::service_host::ServiceHost;
use gatekeeper_core::kernel::timeout_worker::TimeoutWorker;
use gatekeeper_core::kernel::webhook_retry_worker::WebhookRetryWorker;
use notify_rs::{NotificationProvider, SmsProvider, WebhookProvider};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatekeeper_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SchedLock gatekeeper");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(database_path = %config.database_path, "Configuration loaded");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", config.database_path))
        .await
        .context("Failed to open database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let requests = Arc::new(RequestRepository::new(pool.clone()));
    let api_keys = Arc::new(ApiKeyRepository::new(pool.clone()));
    let tokens = Arc::new(TokenRepository::new(pool.clone()));
    let idempotency = Arc::new(IdempotencyRepository::new(pool.clone()));
    let audit = Arc::new(AuditRepository::new(pool.clone()));
    let webhook_failures = Arc::new(WebhookFailureRepository::new(pool.clone()));
    let settings = Arc::new(SettingsRepository::new(pool.clone()));

    let notification_log = NotificationLogRepository::new(pool.clone());
    let providers = build_notification_providers(&config);
    if providers.is_empty() {
        tracing::warn!("no notification providers configured; approval requests will be logged but never delivered");
    }
    let notifications = Arc::new(NotificationManager::new(providers, notification_log));

    // At-rest secret sealing (spec §6): the signing secret is kept in
    // `settings` encrypted under a key HKDF-derives from
    // `SECRET_MASTER_KEY`, so the database file alone never discloses it.
    // An operator-supplied env value reseals and wins over whatever is
    // already stored; otherwise we recover the last sealed value, letting
    // the env var be dropped from the deployment after the first boot.
    let secret_cipher = SecretCipher::derive(&config.secret_master_key, "webhook-signing-secret");
    let webhook_signing_secret = match &config.webhook_signing_secret {
        Some(plaintext) => {
            settings
                .set_encrypted("webhook_signing_secret", &secret_cipher, plaintext)
                .await
                .context("failed to seal webhook signing secret at rest")?;
            Some(plaintext.clone())
        }
        None => settings
            .get_encrypted("webhook_signing_secret", &secret_cipher)
            .await
            .context("failed to recover sealed webhook signing secret")?,
    };

    let webhook_client = Arc::new(OutboundWebhookClient::new(
        config.webhook_url.clone(),
        webhook_signing_secret,
    ));

    // The upstream calendar provider's SDK is out of scope (spec §1); a
    // real `CalendarClient` impl talking to it drops in here without
    // touching anything downstream.
    let calendar: Arc<dyn gatekeeper_core::kernel::calendar_client::CalendarClient> =
        Arc::new(NullCalendar::new());

    let (queue, receiver) = ExecutionQueue::new();

    let engine = Arc::new(Engine::new(
        requests.clone(),
        api_keys.clone(),
        tokens.clone(),
        idempotency.clone(),
        audit.clone(),
        notifications.clone(),
        webhook_client.clone(),
        webhook_failures.clone(),
        queue.clone(),
        calendar.clone(),
        EngineSettings {
            default_request_ttl: chrono::Duration::from_std(config.default_request_ttl)
                .context("DEFAULT_REQUEST_TTL_SECS out of range")?,
            public_base_url: config.public_base_url.clone(),
        },
    ));

    let reconciled = engine
        .reconcile_approved_requests()
        .await
        .context("Failed to reconcile approved requests at startup")?;
    if reconciled > 0 {
        tracing::info!(count = reconciled, "reconciled approved requests stranded by a prior shutdown");
    }

    let retry_policy = RetryPolicy {
        retryable_status_codes: config.retryable_status_codes.clone(),
        backoff_seconds: config.retry_backoff_seconds.clone(),
        max_attempts: config.max_retry_attempts,
    };

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        read_per_minute: config.rate_limit_read_per_minute,
        write_per_minute: config.rate_limit_write_per_minute,
        admin_per_minute: config.rate_limit_admin_per_minute,
        burst: config.rate_limit_burst,
    }));

    let mut service_host = ServiceHost::new();
    service_host.spawn(Box::new(QueueWorker::new(
        receiver,
        requests.clone(),
        calendar.clone(),
        queue.clone(),
        retry_policy.clone(),
        audit.clone(),
        webhook_client.clone(),
        webhook_failures.clone(),
        config.calendar_write_timeout,
    )));
    service_host.spawn(Box::new(TimeoutWorker::new(
        requests.clone(),
        audit.clone(),
        webhook_client.clone(),
        webhook_failures.clone(),
        config.timeout_worker_interval,
    )));
    service_host.spawn(Box::new(CleanupWorker::new(
        pool.clone(),
        idempotency.clone(),
        tokens.clone(),
        requests.clone(),
        settings.clone(),
        rate_limiter.clone(),
        config.idempotency_retention,
        config.rate_limit_idle_eviction,
        config.cleanup_worker_interval,
    )));
    service_host.spawn(Box::new(WebhookRetryWorker::new(
        webhook_failures.clone(),
        requests.clone(),
        webhook_client.clone(),
        retry_policy,
        config.webhook_retry_interval,
    )));

    let state = AppState {
        pool: pool.clone(),
        engine,
        rate_limiter,
        api_key_pepper: Arc::new(config.api_key_pepper.clone()),
    };

    let app = http::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Shutting down background services...");
    service_host.shutdown().await;

    Ok(())
}

/// Providers are additive: a Slack-shaped webhook and/or SMS, each
/// registered only when its full set of environment variables is present.
fn build_notification_providers(config: &Config) -> Vec<Arc<dyn NotificationProvider>> {
    let mut providers: Vec<Arc<dyn NotificationProvider>> = Vec::new();

    if let Some(url) = &config.notification_webhook_url {
        providers.push(Arc::new(WebhookProvider::new("webhook", url.clone())));
    }

    if let (Some(sid), Some(token), Some(from), Some(to)) = (
        &config.twilio_account_sid,
        &config.twilio_auth_token,
        &config.twilio_from_number,
        &config.twilio_to_number,
    ) {
        providers.push(Arc::new(SmsProvider::new(
            sid.clone(),
            token.clone(),
            from.clone(),
            to.clone(),
        )));
    }

    providers
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
