//! `gatekeeper_core`: the calendar write-gate (spec §1-§9) — request
//! lifecycle, policy evaluation, decision tokens, the execution queue,
//! background workers, and the HTTP surface that fronts them.

pub mod common;
pub mod config;
pub mod domains;
pub mod engine;
pub mod http;
pub mod kernel;
