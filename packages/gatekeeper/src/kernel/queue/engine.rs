//! Bounded execution queue (spec §4.5): a capacity-100 channel fronting a
//! single worker, serializing writes to the upstream calendar per the
//! single-calendar assumption. Enqueue blocks rather than drops once full.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::common::RequestId;

#[derive(Clone)]
pub struct ExecutionQueue {
    sender: mpsc::Sender<RequestId>,
}

pub const QUEUE_CAPACITY: usize = 100;

impl ExecutionQueue {
    pub fn new() -> (Self, mpsc::Receiver<RequestId>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Blocks until there's room rather than dropping the id — spec §4.5:
    /// "the engine must not drop enqueues".
    pub async fn enqueue(&self, request_id: RequestId) -> anyhow::Result<()> {
        self.sender
            .send(request_id)
            .await
            .map_err(|_| anyhow::anyhow!("execution queue receiver dropped"))
    }

    /// Re-enqueue after a retry backoff without blocking the worker loop
    /// that's dispatching other work (spec §4.5: "spawn a delayed
    /// re-enqueue so the worker can process other work").
    pub fn schedule_reenqueue(&self, request_id: RequestId, after: Duration) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = sender.send(request_id).await;
        });
    }
}
