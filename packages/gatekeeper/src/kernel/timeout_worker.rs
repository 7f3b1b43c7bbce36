//! Timeout worker (spec §4.6): periodically expires undecided requests.
//!
//! Resolves spec §9's first Open Question explicitly: a request stuck in
//! `change_requested` expires under the same policy as `pending_approval`
//! (see `DESIGN.md`) — `RequestRepository::get_expired` already selects
//! both statuses, so this worker needs no special-casing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::domains::audit::{AuditEventType, AuditRepository};
use crate::domains::requests::{RequestRepository, RequestStatus};
use crate::domains::webhooks::{OutboundWebhookClient, WebhookFailureRepository, WebhookPayload};
use crate::kernel::service_host::Service;

pub struct TimeoutWorker {
    requests: Arc<RequestRepository>,
    audit: Arc<AuditRepository>,
    webhook_client: Arc<OutboundWebhookClient>,
    webhook_failures: Arc<WebhookFailureRepository>,
    interval: Duration,
}

impl TimeoutWorker {
    pub fn new(
        requests: Arc<RequestRepository>,
        audit: Arc<AuditRepository>,
        webhook_client: Arc<OutboundWebhookClient>,
        webhook_failures: Arc<WebhookFailureRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            requests,
            audit,
            webhook_client,
            webhook_failures,
            interval,
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let expired = self.requests.get_expired(Utc::now()).await?;
        for request in expired {
            // A human decision or another worker may have raced this
            // request since `get_expired` read it; a zero-rowcount result
            // just means we lost that race (spec §4.6: "ignore zero-rowcount
            // results").
            let transitioned = self
                .requests
                .update_status(request.id, RequestStatus::Expired, request.status)
                .await?;
            if !transitioned {
                continue;
            }

            self.audit
                .append(
                    AuditEventType::RequestExpired,
                    Some(request.id),
                    Some(request.api_key_id),
                    "timeout_worker",
                    &serde_json::json!({}),
                    None,
                )
                .await?;

            let payload = WebhookPayload::new(request.id, RequestStatus::Expired.as_str(), "request expired before a decision was made");
            let payload_json = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
            match self.webhook_client.deliver(&payload).await {
                Ok(Some(())) => {
                    let _ = self.requests.set_webhook_notified(request.id).await;
                }
                Ok(None) => {}
                Err(error) => {
                    let _ = self
                        .webhook_failures
                        .record(request.id, RequestStatus::Expired.as_str(), &payload_json, &error)
                        .await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Service for TimeoutWorker {
    fn name(&self) -> &'static str {
        "timeout_worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "timeout worker tick failed");
                    }
                }
            }
        }
    }
}
