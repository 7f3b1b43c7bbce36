//! Notification transport for the gatekeeper's human-review channel.
//! Grounded on the teacher's `twilio-rs` crate — a standalone provider
//! client using `reqwest` over a typed `Result` — generalized into a
//! trait so the notification manager can fan out across several
//! providers (spec §4.7). Unlike the teacher's `TwilioService`, every
//! provider here reports through `tracing`, not `eprintln!`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned an error response: {0}")]
    ProviderRejected(String),
    #[error("provider is not configured")]
    NotConfigured,
}

/// The human-readable view of a pending request handed to every provider,
/// built by the engine from a `Request` + its decision token (spec §4.7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalView {
    pub request_id: String,
    pub operation: String,
    pub calendar_id: String,
    pub summary: String,
    pub expires_at: String,
    pub approve_url: String,
    pub deny_url: String,
    pub suggest_url: String,
}

/// A channel capable of delivering an [`ApprovalView`] to a human and, on
/// success, reporting a provider-assigned message id for later callback
/// correlation (spec §4.7).
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, view: &ApprovalView) -> Result<String, NotifyError>;
}

/// Generic JSON webhook provider (Slack incoming-webhook shaped): POSTs the
/// approval view as a simple text payload.
pub struct WebhookProvider {
    client: reqwest::Client,
    url: String,
    name: &'static str,
}

impl WebhookProvider {
    pub fn new(name: &'static str, url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            name,
        }
    }
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, view: &ApprovalView) -> Result<String, NotifyError> {
        let text = format!(
            "New calendar request {} ({}): {}\nApprove: {}\nDeny: {}\nSuggest: {}",
            view.request_id, view.operation, view.summary, view.approve_url, view.deny_url, view.suggest_url
        );
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::ProviderRejected(response.status().to_string()));
        }
        // Webhook providers rarely hand back a durable message id; the
        // delivery timestamp doubles as a correlation key for the log.
        Ok(format!("webhook-{}", unix_timestamp()))
    }
}

/// SMS provider shaped after the teacher's Twilio client: basic-auth REST
/// call, account/service ids baked in at construction.
pub struct SmsProvider {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
}

impl SmsProvider {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            to_number: to_number.into(),
        }
    }
}

#[async_trait]
impl NotificationProvider for SmsProvider {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, view: &ApprovalView) -> Result<String, NotifyError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let body = format!(
            "A calendar request needs your review: {} — approve {} or deny {}",
            view.summary, view.approve_url, view.deny_url
        );
        let form = [
            ("From", self.from_number.as_str()),
            ("To", self.to_number.as_str()),
            ("Body", body.as_str()),
        ];
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::ProviderRejected(response.status().to_string()));
        }
        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed
            .get("sid")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// HMAC-SHA256 signature helper shared with the outbound-webhook domain
/// (kept here too since providers may need to sign their own callbacks).
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic() {
        assert_eq!(sign("secret", b"body"), sign("secret", b"body"));
    }

    #[test]
    fn sign_differs_by_secret() {
        assert_ne!(sign("secret-a", b"body"), sign("secret-b", b"body"));
    }
}
