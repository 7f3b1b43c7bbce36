//! Per-api-key rate limit enforcement (spec §6), applied after
//! authentication so the bucket can be keyed by the authenticated
//! identity rather than the source IP.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::common::AppError;
use crate::http::middleware::auth::AuthContext;
use crate::http::state::AppState;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ctx) = request.extensions().get::<AuthContext>() else {
        // No authenticated identity yet (e.g. the callback routes, which
        // run before auth) — nothing to key a bucket on.
        return Ok(next.run(request).await);
    };

    if state.rate_limiter.check(ctx.api_key.id, ctx.api_key.tier) {
        Ok(next.run(request).await)
    } else {
        Err(AppError::RateLimited { retry_after_secs: 1 })
    }
}
