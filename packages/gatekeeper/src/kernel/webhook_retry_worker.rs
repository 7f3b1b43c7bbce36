//! Webhook retry worker: redelivers recorded [`WebhookFailure`] rows with
//! backoff, reusing the execution queue's retry policy shape (spec §3,
//! §4.9, §6).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domains::requests::RequestRepository;
use crate::domains::webhooks::{OutboundWebhookClient, WebhookFailureRepository, WebhookPayload};
use crate::kernel::queue::RetryPolicy;
use crate::kernel::service_host::Service;

pub struct WebhookRetryWorker {
    failures: Arc<WebhookFailureRepository>,
    requests: Arc<RequestRepository>,
    client: Arc<OutboundWebhookClient>,
    retry_policy: RetryPolicy,
    interval: Duration,
}

impl WebhookRetryWorker {
    pub fn new(
        failures: Arc<WebhookFailureRepository>,
        requests: Arc<RequestRepository>,
        client: Arc<OutboundWebhookClient>,
        retry_policy: RetryPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            failures,
            requests,
            client,
            retry_policy,
            interval,
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let due = self.failures.due_for_retry(self.retry_policy.max_attempts).await?;
        for failure in due {
            let payload: Result<WebhookPayload, _> = serde_json::from_value(failure.payload.clone());
            let Ok(payload) = payload else {
                tracing::error!(webhook_failure_id = %failure.id, "stored webhook payload failed to deserialize");
                continue;
            };

            match self.client.deliver(&payload).await {
                Ok(Some(())) => {
                    self.failures.mark_resolved(failure.id).await?;
                    let _ = self.requests.set_webhook_notified(failure.request_id).await;
                }
                Ok(None) => {
                    self.failures.mark_resolved(failure.id).await?;
                }
                Err(error) => {
                    self.failures.record_retry_attempt(failure.id, Some(error.as_str())).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Service for WebhookRetryWorker {
    fn name(&self) -> &'static str {
        "webhook_retry_worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "webhook retry worker tick failed");
                    }
                }
            }
        }
    }
}
