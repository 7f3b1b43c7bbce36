//! Axum middleware layers (spec §5, §6): authentication, client IP
//! extraction for the audit log, and per-key rate limiting.

pub mod auth;
pub mod ip_extractor;
pub mod rate_limit;
