//! Idempotency cache for client retries (spec §4.8).

mod repository;

pub use repository::IdempotencyRepository;
