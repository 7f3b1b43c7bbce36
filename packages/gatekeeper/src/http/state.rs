//! Shared handler state (spec §6). Mirrors the teacher's `AxumAppState`
//! shape: a small `Clone` struct of `Arc`s handed to every handler via
//! `Extension`, not a mega-struct of every repository individually.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::common::crypto;
use crate::engine::Engine;
use crate::kernel::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub engine: Arc<Engine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub api_key_pepper: Arc<Vec<u8>>,
}

impl AppState {
    pub fn verify_api_key(&self, raw: &str, stored_fingerprint: &str) -> bool {
        crypto::verify_api_key(raw, stored_fingerprint, &self.api_key_pepper)
    }
}
