//! Cleanup/retention worker: evicts idempotency mappings, decision
//! tokens, and idle rate-limit buckets past their windows, deletes old
//! terminal requests, and periodically vacuums the database file,
//! bookmarking the last run in `Settings` (spec §3, §4.8).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::domains::idempotency::IdempotencyRepository;
use crate::domains::requests::RequestRepository;
use crate::domains::settings::SettingsRepository;
use crate::domains::tokens::TokenRepository;
use crate::kernel::rate_limiter::RateLimiter;
use crate::kernel::service_host::Service;

/// Terminal requests are retained for a week by default, long enough for
/// an operator to dig up a failed request's history.
fn request_retention() -> ChronoDuration {
    ChronoDuration::days(7)
}

fn vacuum_interval() -> ChronoDuration {
    ChronoDuration::days(1)
}

pub struct CleanupWorker {
    pool: SqlitePool,
    idempotency: Arc<IdempotencyRepository>,
    tokens: Arc<TokenRepository>,
    requests: Arc<RequestRepository>,
    settings: Arc<SettingsRepository>,
    rate_limiter: Arc<RateLimiter>,
    idempotency_retention: Duration,
    rate_limit_idle_eviction: Duration,
    interval: Duration,
}

impl CleanupWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        idempotency: Arc<IdempotencyRepository>,
        tokens: Arc<TokenRepository>,
        requests: Arc<RequestRepository>,
        settings: Arc<SettingsRepository>,
        rate_limiter: Arc<RateLimiter>,
        idempotency_retention: Duration,
        rate_limit_idle_eviction: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            idempotency,
            tokens,
            requests,
            settings,
            rate_limiter,
            idempotency_retention,
            rate_limit_idle_eviction,
            interval,
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let idempotency_cutoff = now - ChronoDuration::from_std(self.idempotency_retention)?;
        let removed = self.idempotency.delete_older_than(idempotency_cutoff).await?;
        if removed > 0 {
            tracing::debug!(removed, "evicted stale idempotency mappings");
        }

        let token_cutoff = now - ChronoDuration::hours(1);
        self.tokens.delete_expired_older_than(token_cutoff).await?;

        let evicted = self.rate_limiter.evict_stale(self.rate_limit_idle_eviction);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted stale rate limit buckets");
        }

        let request_cutoff = now - request_retention();
        let deleted = self.requests.delete_terminal_older_than(request_cutoff).await?;
        if deleted > 0 {
            tracing::debug!(deleted, "deleted retained-past-window terminal requests");
        }

        let last_vacuum = self.settings.last_vacuum_at().await?;
        let due = last_vacuum.map(|t| now - t > vacuum_interval()).unwrap_or(true);
        if due {
            sqlx::query("VACUUM").execute(&self.pool).await?;
            self.settings.set_last_vacuum_at(now).await?;
            tracing::info!("vacuumed database");
        }

        Ok(())
    }
}

#[async_trait]
impl Service for CleanupWorker {
    fn name(&self) -> &'static str {
        "cleanup_worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "cleanup worker tick failed");
                    }
                }
            }
        }
    }
}
