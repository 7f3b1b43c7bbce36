//! Execution queue: bounded channel, single worker, centralized retry
//! classification (spec §4.5, §4.9).

mod engine;
mod retry;
mod worker;

pub use engine::{ExecutionQueue, QUEUE_CAPACITY};
pub use retry::RetryPolicy;
pub use worker::QueueWorker;
