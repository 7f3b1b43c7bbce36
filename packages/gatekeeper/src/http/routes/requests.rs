//! Request lifecycle endpoints (spec §6): list/inspect a key's own
//! requests, cancel a pending one, and resubmit a `change_requested` one
//! with an edited payload.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::common::{AppError, RequestId};
use crate::domains::api_keys::Tier;
use crate::domains::requests::{Intent, Request as DomainRequest, Suggestion};
use crate::http::middleware::auth::{require_tier, AuthContext};
use crate::http::state::AppState;
use crate::common::pagination::{RequestCursor, MAX_REQUEST_LIST_LIMIT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/requests", axum::routing::get(list_requests))
        .route("/api/requests/:id", axum::routing::get(get_request))
        .route("/api/requests/:id/cancel", axum::routing::post(cancel_request))
        .route("/api/requests/:id/resubmit", axum::routing::post(resubmit_request))
}

fn parse_request_id(raw: &str) -> Result<RequestId, AppError> {
    RequestId::parse(raw).map_err(|_| AppError::Validation("malformed request id".to_string()))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    cursor: Option<String>,
}

#[derive(Serialize)]
struct RequestView {
    id: String,
    operation: String,
    status: String,
    payload: Intent,
    result: Option<serde_json::Value>,
    error: Option<String>,
    suggestion: Option<SuggestionView>,
    created_at: String,
    expires_at: String,
    decided_at: Option<String>,
    decided_by: Option<String>,
    executed_at: Option<String>,
    retry_count: i32,
}

#[derive(Serialize)]
struct SuggestionView {
    text: String,
    by: String,
    at: String,
}

impl From<&Suggestion> for SuggestionView {
    fn from(s: &Suggestion) -> Self {
        Self {
            text: s.text.clone(),
            by: s.by.clone(),
            at: s.at.to_rfc3339(),
        }
    }
}

impl From<&DomainRequest> for RequestView {
    fn from(r: &DomainRequest) -> Self {
        Self {
            id: r.id.to_string(),
            operation: r.operation.as_str().to_string(),
            status: r.status.as_str().to_string(),
            payload: r.payload.clone(),
            result: r.result.clone(),
            error: r.error.clone(),
            suggestion: r.suggestion.as_ref().map(SuggestionView::from),
            created_at: r.created_at.to_rfc3339(),
            expires_at: r.expires_at.to_rfc3339(),
            decided_at: r.decided_at.map(|t| t.to_rfc3339()),
            decided_by: r.decided_by.clone(),
            executed_at: r.executed_at.map(|t| t.to_rfc3339()),
            retry_count: r.retry_count,
        }
    }
}

#[derive(Serialize)]
struct ListResponse {
    requests: Vec<RequestView>,
    next_cursor: Option<String>,
}

async fn list_requests(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    require_tier(&ctx, Tier::Read)?;

    let limit = query.limit.unwrap_or(MAX_REQUEST_LIST_LIMIT).clamp(1, MAX_REQUEST_LIST_LIMIT);
    let before = query
        .cursor
        .as_deref()
        .map(RequestCursor::decode)
        .transpose()
        .and_then(|c| c)
        .map(|c| (c.created_at, c.id));
    if query.cursor.is_some() && before.is_none() {
        return Err(AppError::Validation("malformed pagination cursor".to_string()));
    }

    let mut requests = state.engine.requests().list_by_key(ctx.api_key.id, limit + 1, before).await?;
    let next_cursor = if requests.len() as i64 > limit {
        requests.truncate(limit as usize);
        requests.last().map(|r| RequestCursor { created_at: r.created_at, id: *r.id.as_uuid() }.encode())
    } else {
        None
    };

    Ok(Json(ListResponse {
        requests: requests.iter().map(RequestView::from).collect(),
        next_cursor,
    }))
}

async fn get_request(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, AppError> {
    require_tier(&ctx, Tier::Read)?;
    let id = parse_request_id(&id)?;

    let request = state.engine.requests().find_by_id(id).await?.ok_or(AppError::RequestNotFound)?;
    if request.api_key_id != ctx.api_key.id && ctx.api_key.tier != Tier::Admin {
        return Err(AppError::RequestNotFound);
    }

    Ok(Json(RequestView::from(&request)))
}

async fn cancel_request(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, AppError> {
    require_tier(&ctx, Tier::Write)?;
    let id = parse_request_id(&id)?;
    let request = state.engine.cancel(id, ctx.api_key.id).await?;
    Ok(Json(RequestView::from(&request)))
}

#[derive(Deserialize)]
struct ResubmitBody {
    payload: Intent,
}

async fn resubmit_request(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResubmitBody>,
) -> Result<(StatusCode, Json<RequestView>), AppError> {
    require_tier(&ctx, Tier::Write)?;
    let id = parse_request_id(&id)?;
    let request = state.engine.resubmit(id, &ctx.api_key, body.payload).await?;
    Ok((StatusCode::OK, Json(RequestView::from(&request))))
}
