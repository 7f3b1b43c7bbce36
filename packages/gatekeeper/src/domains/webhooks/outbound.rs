//! Outbound status webhook delivery (spec §6): fire-and-forget POST,
//! HMAC-signed when a signing secret is configured, with failures
//! recorded for the retry worker rather than retried inline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::crypto::sign_webhook_payload;
use crate::common::RequestId;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: &'static str,
    pub request_id: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn new(request_id: RequestId, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: "request.status",
            request_id: request_id.to_string(),
            status: status.into(),
            message: message.into(),
            suggestion: None,
            result: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}

pub struct OutboundWebhookClient {
    client: reqwest::Client,
    url: Option<String>,
    signing_secret: Option<String>,
}

impl OutboundWebhookClient {
    pub fn new(url: Option<String>, signing_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            signing_secret,
        }
    }

    /// Returns `Ok(None)` when no webhook URL is configured (a no-op
    /// deployment), `Ok(Some(()))` on a successful delivery, or `Err`
    /// carrying the sanitized failure reason for the caller to record.
    pub async fn deliver(&self, payload: &WebhookPayload) -> Result<Option<()>, String> {
        let Some(url) = &self.url else {
            return Ok(None);
        };
        let body = serde_json::to_vec(payload).map_err(|e| e.to_string())?;

        let mut request = self.client.post(url).header("content-type", "application/json").body(body.clone());
        if let Some(secret) = &self.signing_secret {
            let signature = sign_webhook_payload(secret, &body);
            request = request.header("X-SchedLock-Signature", signature);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(Some(()))
        } else {
            Err(format!("webhook endpoint returned {}", response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn payload_serializes_with_optional_fields_omitted() {
        let payload = WebhookPayload::new(RequestId::from_uuid(Uuid::new_v4()), "approved", "ok");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("suggestion").is_none());
        assert!(json.get("result").is_none());
    }
}
