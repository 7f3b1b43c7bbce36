//! The engine (spec §2 step 7): orchestrates submit → notify → decision →
//! execute → report. Every method here is a thin composition of the
//! repositories, the policy evaluator, and the execution queue — the
//! engine itself holds no durable state, matching spec §3's ownership
//! rule ("in-memory components ... must not cache mutable request fields
//! across suspensions").

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify_rs::ApprovalView;

use crate::common::{ApiKeyId, AppError, AppResult, RequestId};
use crate::domains::api_keys::{ApiKey, ApiKeyRepository, KeyConstraints, Tier};
use crate::domains::audit::{AuditEventType, AuditRepository};
use crate::domains::idempotency::IdempotencyRepository;
use crate::domains::notifications::NotificationManager;
use crate::domains::policy::{self, EvaluationInput, FieldResolution, PolicyDecision};
use crate::domains::requests::{DeleteEventIntent, Intent, Request, RequestRepository, RequestStatus};
use crate::domains::tokens::{ConsumeOutcome, DecisionAction, TokenRepository};
use crate::domains::webhooks::{OutboundWebhookClient, WebhookFailureRepository, WebhookPayload};
use crate::kernel::calendar_client::CalendarClient;
use crate::kernel::queue::ExecutionQueue;

/// The subset of [`crate::config::Config`] the engine needs, passed in
/// explicitly rather than the whole struct so callers (tests included)
/// don't have to fabricate unrelated fields like rate-limit tiers.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_request_ttl: chrono::Duration,
    pub public_base_url: String,
}

pub struct SubmitOutcome {
    pub request: Request,
    /// `false` when an idempotency key matched an existing submission —
    /// the caller should not treat this as a fresh 202/200.
    pub created: bool,
}

pub struct Engine {
    requests: Arc<RequestRepository>,
    api_keys: Arc<ApiKeyRepository>,
    tokens: Arc<TokenRepository>,
    idempotency: Arc<IdempotencyRepository>,
    audit: Arc<AuditRepository>,
    notifications: Arc<NotificationManager>,
    webhook_client: Arc<OutboundWebhookClient>,
    webhook_failures: Arc<WebhookFailureRepository>,
    queue: ExecutionQueue,
    calendar: Arc<dyn CalendarClient>,
    settings: EngineSettings,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requests: Arc<RequestRepository>,
        api_keys: Arc<ApiKeyRepository>,
        tokens: Arc<TokenRepository>,
        idempotency: Arc<IdempotencyRepository>,
        audit: Arc<AuditRepository>,
        notifications: Arc<NotificationManager>,
        webhook_client: Arc<OutboundWebhookClient>,
        webhook_failures: Arc<WebhookFailureRepository>,
        queue: ExecutionQueue,
        calendar: Arc<dyn CalendarClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            requests,
            api_keys,
            tokens,
            idempotency,
            audit,
            notifications,
            webhook_client,
            webhook_failures,
            queue,
            calendar,
            settings,
        }
    }

    /// Resolve the fully-materialized fields an intent acts on, fetching
    /// the current event for updates so partially-specified patches can
    /// be evaluated against their effective (not just submitted) shape
    /// (spec §4.2).
    async fn resolve_evaluation_input(&self, intent: &Intent) -> EvaluationInput {
        match intent {
            Intent::CreateEvent(i) => EvaluationInput {
                operation: intent.operation(),
                calendar_id: i.calendar_id.clone(),
                attendees: i.attendees.clone(),
                start: i.start,
                end: i.end,
                resolution: FieldResolution::Resolved,
            },
            Intent::DeleteEvent(i) => EvaluationInput {
                operation: intent.operation(),
                calendar_id: i.calendar_id.clone(),
                attendees: Vec::new(),
                start: Utc::now(),
                end: Utc::now(),
                resolution: FieldResolution::Resolved,
            },
            Intent::UpdateEvent(i) => {
                match self.calendar.get_event(&i.calendar_id, &i.event_id).await {
                    Ok(current) => {
                        let current_start = current
                            .get("start")
                            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
                        let current_end = current
                            .get("end")
                            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
                        let current_attendees: Vec<String> = current
                            .get("attendees")
                            .and_then(|v| serde_json::from_value(v.clone()).ok())
                            .unwrap_or_default();

                        match (i.start.or(current_start), i.end.or(current_end)) {
                            (Some(start), Some(end)) => EvaluationInput {
                                operation: intent.operation(),
                                calendar_id: i.calendar_id.clone(),
                                attendees: i.attendees.clone().unwrap_or(current_attendees),
                                start,
                                end,
                                resolution: FieldResolution::Resolved,
                            },
                            // The provider's record didn't carry parseable
                            // start/end and the client didn't supply them
                            // either — same as a fetch failure: fail closed.
                            _ => fail_closed_input(intent),
                        }
                    }
                    Err(error) => {
                        tracing::warn!(calendar_id = %i.calendar_id, event_id = %i.event_id, error = %error, "failed to fetch current event for update evaluation; failing closed");
                        fail_closed_input(intent)
                    }
                }
            }
        }
    }

    fn constraints_for<'a>(key: &'a ApiKey) -> Option<&'a KeyConstraints> {
        key.constraints.as_ref()
    }

    /// Submit a new mutation intent (spec §4.8, §6's create/update/delete
    /// endpoints). Idempotent retries within the 24h window short-circuit
    /// before policy evaluation and never create a second request.
    pub async fn submit(
        &self,
        key: &ApiKey,
        intent: Intent,
        idempotency_key: Option<&str>,
        ip_address: Option<&str>,
    ) -> AppResult<SubmitOutcome> {
        if let Some(client_key) = idempotency_key {
            if let Some(existing_id) = self.idempotency.find(key.id, client_key).await? {
                let existing = self
                    .requests
                    .find_by_id(existing_id)
                    .await?
                    .ok_or(AppError::RequestNotFound)?;
                return Ok(SubmitOutcome {
                    request: existing,
                    created: false,
                });
            }
        }

        let input = self.resolve_evaluation_input(&intent).await;
        let decision = policy::evaluate(key.tier, Self::constraints_for(key), &input);

        let PolicyDecision::Deny(violation) = &decision else {
            return self.create_and_dispatch(key, intent, idempotency_key, ip_address, decision).await;
        };
        Err(AppError::ConstraintViolation {
            constraint: violation.constraint.clone(),
            message: violation.message.clone(),
        })
    }

    async fn create_and_dispatch(
        &self,
        key: &ApiKey,
        intent: Intent,
        idempotency_key: Option<&str>,
        ip_address: Option<&str>,
        decision: PolicyDecision,
    ) -> AppResult<SubmitOutcome> {
        let id = RequestId::new();
        let expires_at = Utc::now() + self.settings.default_request_ttl;
        let request = self.requests.create(id, key.id, &intent, expires_at).await?;

        let request = if let Some(client_key) = idempotency_key {
            if self.idempotency.insert_if_absent(key.id, client_key, id).await? {
                request
            } else {
                // Lost the race: another submit with the same key won.
                // Our row is orphaned (never referenced by the mapping)
                // and will fall out via the retention/timeout workers.
                let winner_id = self
                    .idempotency
                    .find(key.id, client_key)
                    .await?
                    .ok_or(AppError::RequestNotFound)?;
                self.requests
                    .find_by_id(winner_id)
                    .await?
                    .ok_or(AppError::RequestNotFound)?
            }
        } else {
            request
        };

        self.audit
            .append(
                AuditEventType::RequestSubmitted,
                Some(request.id),
                Some(key.id),
                "api_client",
                &serde_json::json!({ "operation": request.operation.as_str() }),
                ip_address,
            )
            .await?;

        match decision {
            PolicyDecision::Allow => {
                let approved = self.requests.decide(request.id, RequestStatus::Approved, "policy:auto").await?;
                if approved {
                    self.audit
                        .append(
                            AuditEventType::RequestApproved,
                            Some(request.id),
                            Some(key.id),
                            "policy:auto",
                            &serde_json::json!({}),
                            None,
                        )
                        .await?;
                    self.queue.enqueue(request.id).await.map_err(anyhow::Error::from)?;
                }
            }
            PolicyDecision::RequireApproval => {
                self.notify_pending(&request).await?;
            }
            PolicyDecision::Deny(_) => unreachable!("deny short-circuits before this point"),
        }

        let request = self.requests.find_by_id(request.id).await?.ok_or(AppError::RequestNotFound)?;
        Ok(SubmitOutcome { request, created: true })
    }

    async fn notify_pending(&self, request: &Request) -> AppResult<()> {
        let raw_token = self
            .tokens
            .mint(
                request.id,
                &[DecisionAction::Approve, DecisionAction::Deny, DecisionAction::Suggest],
                request.expires_at,
            )
            .await?;

        let base = &self.settings.public_base_url;
        let view = ApprovalView {
            request_id: request.id.to_string(),
            operation: request.operation.as_str().to_string(),
            calendar_id: request.payload.calendar_id().to_string(),
            summary: summarize(&request.payload),
            expires_at: request.expires_at.to_rfc3339(),
            approve_url: format!("{base}/api/callback/approve/{raw_token}"),
            deny_url: format!("{base}/api/callback/deny/{raw_token}"),
            suggest_url: format!("{base}/api/callback/suggest/{raw_token}"),
        };

        // Never lets a notification failure fail the submit call (spec
        // §4.7); `notify` itself already swallows per-provider errors.
        self.notifications.notify(request.id, &view).await?;
        Ok(())
    }

    /// Resolve a presented decision token against an action (spec §4.4,
    /// the `GET/POST /api/callback/{approve,deny}/{token}` and
    /// `POST /api/callback/suggest/{token}` routes).
    pub async fn decide_via_token(
        &self,
        raw_token: &str,
        action: DecisionAction,
        suggestion: Option<String>,
    ) -> AppResult<Request> {
        if action == DecisionAction::Suggest && suggestion.as_deref().unwrap_or("").trim().is_empty() {
            return Err(AppError::Validation("suggestion text must not be empty".to_string()));
        }

        let outcome = self.tokens.consume(raw_token, action).await?;
        let request_id = match outcome {
            ConsumeOutcome::Consumed(id) => id,
            ConsumeOutcome::NotFound => return Err(AppError::InvalidToken),
            ConsumeOutcome::Expired => return Err(AppError::TokenExpired),
            ConsumeOutcome::AlreadyConsumed => return Err(AppError::TokenConsumed),
            ConsumeOutcome::ActionNotAllowed => {
                return Err(AppError::InsufficientPermissions("token does not allow this action".to_string()))
            }
        };

        let request = self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)?;

        let transitioned = match action {
            DecisionAction::Approve => {
                let ok = self.requests.decide(request_id, RequestStatus::Approved, "human:token").await?;
                if ok {
                    self.audit
                        .append(
                            AuditEventType::RequestApproved,
                            Some(request_id),
                            Some(request.api_key_id),
                            "human:token",
                            &serde_json::json!({}),
                            None,
                        )
                        .await?;
                    self.queue.enqueue(request_id).await.map_err(anyhow::Error::from)?;
                }
                ok
            }
            DecisionAction::Deny => {
                let ok = self.requests.decide(request_id, RequestStatus::Denied, "human:token").await?;
                if ok {
                    self.audit
                        .append(
                            AuditEventType::RequestDenied,
                            Some(request_id),
                            Some(request.api_key_id),
                            "human:token",
                            &serde_json::json!({}),
                            None,
                        )
                        .await?;
                    self.emit_webhook(request_id, RequestStatus::Denied, "request denied", None, None).await;
                }
                ok
            }
            DecisionAction::Suggest => {
                let text = suggestion.unwrap_or_default();
                let ok = self.requests.set_suggestion(request_id, &text, "human:token").await?;
                if ok {
                    self.audit
                        .append(
                            AuditEventType::RequestSuggested,
                            Some(request_id),
                            Some(request.api_key_id),
                            "human:token",
                            &serde_json::json!({ "suggestion": text }),
                            None,
                        )
                        .await?;
                    self.emit_webhook(request_id, RequestStatus::ChangeRequested, "change requested", Some(text), None)
                        .await;
                }
                ok
            }
        };

        if !transitioned {
            // A concurrent decision or the timeout worker won the race
            // (spec §4.1's tie-break, spec §8 invariant 5) — the token
            // was consumed, but the status transition lost.
            let current = self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)?;
            return Err(AppError::AlreadyResolved(current.status.as_str().to_string()));
        }

        self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)
    }

    /// Resubmit a `change_requested` request with an edited intent,
    /// looping back through policy evaluation under the same id (spec
    /// §4.1's `resubmit(edit)` transition). Not named in spec §6's route
    /// table explicitly; exposed at `POST /api/requests/{id}/resubmit`
    /// (see `DESIGN.md`'s Open Question notes).
    pub async fn resubmit(&self, request_id: RequestId, owning_key: &ApiKey, intent: Intent) -> AppResult<Request> {
        let existing = self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)?;
        if existing.api_key_id != owning_key.id {
            return Err(AppError::RequestNotFound);
        }
        if existing.status != RequestStatus::ChangeRequested {
            return Err(AppError::AlreadyResolved(existing.status.as_str().to_string()));
        }

        let input = self.resolve_evaluation_input(&intent).await;
        let decision = policy::evaluate(owning_key.tier, Self::constraints_for(owning_key), &input);
        if let PolicyDecision::Deny(violation) = &decision {
            return Err(AppError::ConstraintViolation {
                constraint: violation.constraint.clone(),
                message: violation.message.clone(),
            });
        }

        let expires_at = Utc::now() + self.settings.default_request_ttl;
        if !self.requests.resubmit(request_id, &intent, expires_at).await? {
            return Err(AppError::AlreadyResolved(existing.status.as_str().to_string()));
        }

        self.audit
            .append(
                AuditEventType::RequestResubmitted,
                Some(request_id),
                Some(owning_key.id),
                "api_client",
                &serde_json::json!({}),
                None,
            )
            .await?;

        let request = self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)?;
        match decision {
            PolicyDecision::Allow => {
                if self.requests.decide(request_id, RequestStatus::Approved, "policy:auto").await? {
                    self.audit
                        .append(
                            AuditEventType::RequestApproved,
                            Some(request_id),
                            Some(owning_key.id),
                            "policy:auto",
                            &serde_json::json!({}),
                            None,
                        )
                        .await?;
                    self.queue.enqueue(request_id).await.map_err(anyhow::Error::from)?;
                }
            }
            PolicyDecision::RequireApproval => self.notify_pending(&request).await?,
            PolicyDecision::Deny(_) => unreachable!("deny short-circuits above"),
        }

        self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)
    }

    /// Cancel a still-pending request owned by the calling key (spec
    /// §4.3's `cancel`, the `POST /api/requests/{id}/cancel` route).
    pub async fn cancel(&self, request_id: RequestId, owning_key_id: ApiKeyId) -> AppResult<Request> {
        if !self.requests.cancel(request_id, owning_key_id).await? {
            let existing = self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)?;
            return Err(AppError::AlreadyResolved(existing.status.as_str().to_string()));
        }
        self.audit
            .append(
                AuditEventType::RequestCancelled,
                Some(request_id),
                Some(owning_key_id),
                "owner",
                &serde_json::json!({}),
                None,
            )
            .await?;
        self.requests.find_by_id(request_id).await?.ok_or(AppError::RequestNotFound)
    }

    async fn emit_webhook(
        &self,
        request_id: RequestId,
        status: RequestStatus,
        message: &str,
        suggestion: Option<String>,
        result: Option<serde_json::Value>,
    ) {
        let mut payload = WebhookPayload::new(request_id, status.as_str(), message);
        if let Some(suggestion) = suggestion {
            payload = payload.with_suggestion(suggestion);
        }
        if let Some(result) = result {
            payload = payload.with_result(result);
        }
        let payload_json = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        match self.webhook_client.deliver(&payload).await {
            Ok(Some(())) => {
                let _ = self.requests.set_webhook_notified(request_id).await;
            }
            Ok(None) => {}
            Err(error) => {
                let _ = self.webhook_failures.record(request_id, status.as_str(), &payload_json, &error).await;
            }
        }
    }

    /// Startup reconciliation (spec §2, §9's Open Question): re-enqueue
    /// every request left `approved` by a prior process, since the
    /// execution queue's channel is in-memory and does not survive a
    /// restart.
    pub async fn reconcile_approved_requests(&self) -> AppResult<usize> {
        let approved = self.requests.get_approved().await?;
        let count = approved.len();
        for request in approved {
            self.queue.enqueue(request.id).await.map_err(anyhow::Error::from)?;
        }
        if count > 0 {
            tracing::info!(count, "reconciled approved requests left over from a prior process");
        }
        Ok(count)
    }

    pub fn api_keys(&self) -> &ApiKeyRepository {
        &self.api_keys
    }

    pub fn requests(&self) -> &RequestRepository {
        &self.requests
    }

    pub fn audit(&self) -> &AuditRepository {
        &self.audit
    }

    pub fn calendar(&self) -> &Arc<dyn CalendarClient> {
        &self.calendar
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }
}

fn fail_closed_input(intent: &Intent) -> EvaluationInput {
    EvaluationInput {
        operation: intent.operation(),
        calendar_id: intent.calendar_id().to_string(),
        attendees: Vec::new(),
        start: Utc::now(),
        end: Utc::now(),
        resolution: FieldResolution::FetchFailed,
    }
}

fn summarize(intent: &Intent) -> String {
    match intent {
        Intent::CreateEvent(i) => i.summary.clone(),
        Intent::UpdateEvent(i) => i.summary.clone().unwrap_or_else(|| format!("update to event {}", i.event_id)),
        Intent::DeleteEvent(DeleteEventIntent { event_id, .. }) => format!("delete event {event_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::requests::CreateEventIntent;
    use chrono::Duration;

    fn settings() -> EngineSettings {
        EngineSettings {
            default_request_ttl: Duration::hours(24),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }

    fn create_intent(attendees: Vec<&str>) -> Intent {
        let start = Utc::now();
        Intent::CreateEvent(CreateEventIntent {
            calendar_id: "primary".to_string(),
            summary: "Sync".to_string(),
            description: None,
            start,
            end: start + Duration::minutes(30),
            attendees: attendees.into_iter().map(String::from).collect(),
        })
    }

    #[test]
    fn summarize_falls_back_to_event_id_for_unnamed_updates() {
        use crate::domains::requests::UpdateEventIntent;
        let intent = Intent::UpdateEvent(UpdateEventIntent {
            calendar_id: "primary".to_string(),
            event_id: "evt_1".to_string(),
            summary: None,
            description: None,
            start: None,
            end: None,
            attendees: None,
        });
        assert!(summarize(&intent).contains("evt_1"));
    }

    #[test]
    fn engine_settings_is_cloneable_for_test_fixtures() {
        let _ = settings();
        let _ = create_intent(vec!["a@x.com"]);
    }
}
