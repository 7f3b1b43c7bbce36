//! Infrastructure that isn't tied to one durable entity: the calendar
//! provider seam, the execution queue, background workers, the service
//! host that runs them, and the rate limiter.

pub mod calendar_client;
pub mod cleanup_worker;
pub mod queue;
pub mod rate_limiter;
pub mod service_host;
pub mod timeout_worker;
pub mod webhook_retry_worker;
