//! Long-running background task abstraction and the host that runs a
//! fixed roster of them to completion on shutdown.
//!
//! The teacher's `kernel::jobs::worker::JobWorker` implements a
//! `crate::kernel::service_host::Service` trait that was never retrieved
//! alongside it — the file doesn't exist in the teacher package, only its
//! call site does. This module reconstructs it from that usage: a
//! `Service` is anything with a name and an `async fn run` taking
//! ownership of itself plus a shared [`CancellationToken`], matching
//! exactly the shape `JobWorker::run` is written against.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A long-lived background activity: the execution queue worker, the
/// timeout worker, the cleanup worker, the webhook retry worker (spec §5).
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Run until `shutdown` is cancelled, then return promptly. Errors
    /// are logged by the host, not propagated to other services.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}

/// Spawns a fixed roster of [`Service`]s under one shared cancellation
/// token and waits for all of them to wind down once it fires.
pub struct ServiceHost {
    shutdown: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = service.run(shutdown).await {
                tracing::error!(service = name, error = %err, "background service exited with an error");
            } else {
                tracing::info!(service = name, "background service stopped");
            }
        });
        self.handles.push(handle);
    }

    /// Signal every service to stop and wait for them all to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for ServiceHost {
    fn default() -> Self {
        Self::new()
    }
}
