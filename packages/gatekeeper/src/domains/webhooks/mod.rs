//! Outbound status webhooks, with failure tracking and backoff retry
//! (spec §3, §4.9, §6).

mod failures;
mod outbound;

pub use failures::{WebhookFailure, WebhookFailureRepository};
pub use outbound::{OutboundWebhookClient, WebhookPayload};
