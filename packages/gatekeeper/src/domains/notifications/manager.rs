//! Notification fan-out (spec §4.7): iterate enabled providers, log each
//! attempt, and never let a provider failure fail the submit call — the
//! human can still act through the web UI even if every channel failed.

use std::sync::Arc;

use notify_rs::{ApprovalView, NotificationProvider};
use tokio::sync::RwLock;

use super::log::{NotificationLogRepository, NotificationStatus};
use crate::common::{AppResult, NotificationLogEntryId, RequestId};

/// Guards the provider list with a reader/writer lock (spec §5: "reads
/// dominate" — fan-out reads the list on every submit, while reconfiguring
/// providers is rare).
pub struct NotificationManager {
    providers: RwLock<Vec<Arc<dyn NotificationProvider>>>,
    log: NotificationLogRepository,
}

impl NotificationManager {
    pub fn new(providers: Vec<Arc<dyn NotificationProvider>>, log: NotificationLogRepository) -> Self {
        Self {
            providers: RwLock::new(providers),
            log,
        }
    }

    /// Correlate an inbound provider delivery receipt with the attempt
    /// logged when it was sent (spec §4.7). Returns `false` when no
    /// matching `(provider, message id)` row exists, e.g. a replayed or
    /// forged callback.
    pub async fn record_callback(&self, provider: &str, provider_message_id: &str) -> AppResult<bool> {
        self.log.record_callback(provider, provider_message_id).await
    }

    /// Fan out to every enabled provider concurrently; never returns an
    /// error — failures are logged and swallowed per spec §4.7.
    pub async fn notify(&self, request_id: RequestId, view: &ApprovalView) -> AppResult<()> {
        let providers = self.providers.read().await.clone();
        let sends = providers.into_iter().map(|provider| {
            let view = view.clone();
            async move {
                let result = provider.send(&view).await;
                (provider.name(), result)
            }
        });

        for (name, result) in futures::future::join_all(sends).await {
            match result {
                Ok(message_id) => {
                    self.log
                        .record_attempt(
                            NotificationLogEntryId::new(),
                            request_id,
                            name,
                            NotificationStatus::Sent,
                            Some(&message_id),
                            None,
                        )
                        .await?;
                }
                Err(err) => {
                    tracing::warn!(provider = name, error = %err, "notification delivery failed");
                    self.log
                        .record_attempt(
                            NotificationLogEntryId::new(),
                            request_id,
                            name,
                            NotificationStatus::Failed,
                            None,
                            Some(&err.to_string()),
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }
}
