//! The execution queue worker (spec §4.5): the single writer to the
//! upstream calendar. Mirrors the teacher's `JobWorker::process_job` loop
//! shape — claim, dispatch, classify, complete — generalized from a
//! generic job payload to a `Request`'s intent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use super::engine::ExecutionQueue;
use super::retry::RetryPolicy;
use crate::common::RequestId;
use crate::domains::audit::{AuditEventType, AuditRepository};
use crate::domains::requests::{Intent, RequestRepository, RequestStatus};
use crate::domains::webhooks::{OutboundWebhookClient, WebhookFailureRepository, WebhookPayload};
use crate::kernel::calendar_client::{CalendarClient, CalendarError};
use crate::kernel::service_host::Service;

pub struct QueueWorker {
    receiver: Receiver<RequestId>,
    requests: Arc<RequestRepository>,
    calendar: Arc<dyn CalendarClient>,
    queue: ExecutionQueue,
    retry_policy: RetryPolicy,
    audit: Arc<AuditRepository>,
    webhook_client: Arc<OutboundWebhookClient>,
    webhook_failures: Arc<WebhookFailureRepository>,
    write_timeout: Duration,
}

impl QueueWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receiver: Receiver<RequestId>,
        requests: Arc<RequestRepository>,
        calendar: Arc<dyn CalendarClient>,
        queue: ExecutionQueue,
        retry_policy: RetryPolicy,
        audit: Arc<AuditRepository>,
        webhook_client: Arc<OutboundWebhookClient>,
        webhook_failures: Arc<WebhookFailureRepository>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            requests,
            calendar,
            queue,
            retry_policy,
            audit,
            webhook_client,
            webhook_failures,
            write_timeout,
        }
    }

    async fn dispatch(&self, intent: &Intent) -> Result<Value, CalendarError> {
        let call = async {
            match intent {
                Intent::CreateEvent(i) => {
                    let body = serde_json::json!({
                        "summary": i.summary,
                        "description": i.description,
                        "start": i.start,
                        "end": i.end,
                        "attendees": i.attendees,
                    });
                    self.calendar.create_event(&i.calendar_id, &body).await
                }
                Intent::UpdateEvent(i) => {
                    let mut patch = serde_json::Map::new();
                    if let Some(v) = &i.summary {
                        patch.insert("summary".into(), Value::String(v.clone()));
                    }
                    if let Some(v) = &i.description {
                        patch.insert("description".into(), Value::String(v.clone()));
                    }
                    if let Some(v) = &i.start {
                        patch.insert("start".into(), serde_json::to_value(v).unwrap());
                    }
                    if let Some(v) = &i.end {
                        patch.insert("end".into(), serde_json::to_value(v).unwrap());
                    }
                    if let Some(v) = &i.attendees {
                        patch.insert("attendees".into(), serde_json::to_value(v).unwrap());
                    }
                    self.calendar
                        .update_event(&i.calendar_id, &i.event_id, &Value::Object(patch))
                        .await
                }
                Intent::DeleteEvent(i) => {
                    self.calendar.delete_event(&i.calendar_id, &i.event_id).await?;
                    Ok(serde_json::json!({ "deleted": true }))
                }
            }
        };

        match tokio::time::timeout(self.write_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CalendarError::timeout("calendar write deadline exceeded")),
        }
    }

    async fn emit_webhook(&self, request_id: RequestId, status: RequestStatus, message: &str, result: Option<Value>) {
        let mut payload = WebhookPayload::new(request_id, status.as_str(), message);
        if let Some(result) = result {
            payload = payload.with_result(result);
        }
        let payload_json = serde_json::to_value(&payload).unwrap_or(Value::Null);
        match self.webhook_client.deliver(&payload).await {
            Ok(Some(())) => {
                let _ = self.requests.set_webhook_notified(request_id).await;
            }
            Ok(None) => {}
            Err(error) => {
                let _ = self
                    .webhook_failures
                    .record(request_id, status.as_str(), &payload_json, &error)
                    .await;
            }
        }
    }

    async fn process(&self, request_id: RequestId) -> anyhow::Result<()> {
        let Some(request) = self.requests.find_by_id(request_id).await? else {
            return Ok(());
        };
        // Defensive: another actor may have moved this request since it
        // was enqueued (spec §4.5: "verify status is approved; skip if not").
        if request.status != RequestStatus::Approved {
            return Ok(());
        }
        if !self.requests.set_executing(request_id).await? {
            return Ok(());
        }
        self.audit
            .append(
                AuditEventType::RequestExecuting,
                Some(request_id),
                Some(request.api_key_id),
                "queue_worker",
                &serde_json::json!({}),
                None,
            )
            .await?;

        match self.dispatch(&request.payload).await {
            Ok(result) => {
                self.requests.set_result(request_id, &result).await?;
                self.audit
                    .append(
                        AuditEventType::RequestCompleted,
                        Some(request_id),
                        Some(request.api_key_id),
                        "queue_worker",
                        &serde_json::json!({}),
                        None,
                    )
                    .await?;
                self.emit_webhook(request_id, RequestStatus::Completed, "request completed", Some(result))
                    .await;
            }
            Err(error) => {
                if self.retry_policy.is_retryable(&error) && !self.retry_policy.attempts_exhausted(request.retry_count) {
                    if let Some(retry_count) = self.requests.increment_retry_and_requeue(request_id).await? {
                        let backoff = self.retry_policy.backoff_for(retry_count);
                        self.queue.schedule_reenqueue(request_id, Duration::from_secs(backoff));
                    }
                } else {
                    self.requests.set_error(request_id, &error.message).await?;
                    self.audit
                        .append(
                            AuditEventType::RequestFailed,
                            Some(request_id),
                            Some(request.api_key_id),
                            "queue_worker",
                            &serde_json::json!({ "error": error.message }),
                            None,
                        )
                        .await?;
                    self.emit_webhook(request_id, RequestStatus::Failed, &error.message, None).await;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Service for QueueWorker {
    fn name(&self) -> &'static str {
        "execution_queue_worker"
    }

    async fn run(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    // In-flight work (awaited inside `process`) completes
                    // before this loop observes cancellation on its next
                    // iteration; unclaimed ids in the channel are left for
                    // the next process's startup reconciliation pass.
                    return Ok(());
                }
                maybe_id = self.receiver.recv() => {
                    let Some(request_id) = maybe_id else { return Ok(()) };
                    if let Err(err) = self.process(request_id).await {
                        tracing::error!(request_id = %request_id, error = %err, "execution queue worker failed to process request");
                    }
                }
            }
        }
    }
}
