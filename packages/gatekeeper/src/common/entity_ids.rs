//! Typed ID aliases for every durable entity in the data model (spec §3).

use super::id::{Id, Prefixed};

/// Marker + alias for [`crate::domains::api_keys::models::ApiKey`].
pub struct ApiKey;
impl Prefixed for ApiKey {
    const PREFIX: &'static str = "key";
}
pub type ApiKeyId = Id<ApiKey>;

/// Marker + alias for [`crate::domains::requests::models::Request`].
pub struct Request;
impl Prefixed for Request {
    const PREFIX: &'static str = "req";
}
pub type RequestId = Id<Request>;

/// Marker + alias for [`crate::domains::audit::models::AuditEntry`].
pub struct AuditEntry;
impl Prefixed for AuditEntry {
    const PREFIX: &'static str = "aud";
}
pub type AuditEntryId = Id<AuditEntry>;

/// Marker + alias for [`crate::domains::notifications::log::NotificationLogEntry`].
pub struct NotificationLogEntry;
impl Prefixed for NotificationLogEntry {
    const PREFIX: &'static str = "ntf";
}
pub type NotificationLogEntryId = Id<NotificationLogEntry>;

/// Marker + alias for [`crate::domains::webhooks::failures::WebhookFailure`].
pub struct WebhookFailure;
impl Prefixed for WebhookFailure {
    const PREFIX: &'static str = "whf";
}
pub type WebhookFailureId = Id<WebhookFailure>;
