//! Unauthenticated decision-token callbacks (spec §4.4, §6): the links
//! embedded in a notification. No `AuthContext` — the raw token in the
//! path carries its own authorization, scoped to a single action.
//!
//! Also carries the inbound provider delivery-receipt callback (spec
//! §4.7), which correlates by `(provider, message id)` rather than a
//! token and so lives in this same unauthenticated group.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Json, Router};
use serde::Deserialize;

use crate::common::AppError;
use crate::domains::tokens::DecisionAction;
use crate::http::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/callback/approve/:token",
            axum::routing::get(approve).post(approve),
        )
        .route("/api/callback/deny/:token", axum::routing::get(deny).post(deny))
        .route("/api/callback/suggest/:token", axum::routing::post(suggest))
        .route(
            "/api/callback/notifications/:provider",
            axum::routing::post(notification_callback),
        )
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

fn render(headers: &HeaderMap, action: &str, result: Result<String, AppError>) -> Response {
    match result {
        Ok(status) => {
            if wants_html(headers) {
                Html(format!(
                    "<!doctype html><html><body><h1>Request {action}</h1><p>New status: {status}</p></body></html>"
                ))
                .into_response()
            } else {
                (StatusCode::OK, Json(serde_json::json!({ "status": status }))).into_response()
            }
        }
        Err(err) => {
            if wants_html(headers) {
                let status_code = err.http_status();
                let body = format!(
                    "<!doctype html><html><body><h1>Could not {action} request</h1><p>{err}</p></body></html>"
                );
                (status_code, Html(body)).into_response()
            } else {
                err.into_response()
            }
        }
    }
}

async fn approve(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = state
        .engine
        .decide_via_token(&token, DecisionAction::Approve, None)
        .await
        .map(|r| r.status.as_str().to_string());
    render(&headers, "approve", result)
}

async fn deny(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = state
        .engine
        .decide_via_token(&token, DecisionAction::Deny, None)
        .await
        .map(|r| r.status.as_str().to_string());
    render(&headers, "deny", result)
}

#[derive(Deserialize)]
struct SuggestBody {
    suggestion: Option<String>,
}

#[derive(Deserialize)]
struct SuggestQuery {
    suggestion: Option<String>,
}

async fn suggest(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<SuggestQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let from_body = if !body.is_empty() {
        serde_json::from_slice::<SuggestBody>(&body).ok().and_then(|b| b.suggestion)
    } else {
        None
    };
    let suggestion = from_body.or(query.suggestion);

    let result = state
        .engine
        .decide_via_token(&token, DecisionAction::Suggest, suggestion)
        .await
        .map(|r| r.status.as_str().to_string());
    render(&headers, "suggest a change to", result)
}

#[derive(Deserialize)]
struct NotificationCallbackBody {
    message_id: Option<String>,
}

#[derive(Deserialize)]
struct NotificationCallbackQuery {
    message_id: Option<String>,
}

/// A provider's delivery-receipt callback (e.g. a webhook provider
/// reporting that a message was read or acknowledged). Matched against
/// the log row `notify()` wrote when the message was sent; a provider
/// that never supplies a message id has nothing to correlate against and
/// this simply reports no match.
async fn notification_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<NotificationCallbackQuery>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let from_body = if !body.is_empty() {
        serde_json::from_slice::<NotificationCallbackBody>(&body).ok().and_then(|b| b.message_id)
    } else {
        None
    };
    let message_id = from_body
        .or(query.message_id)
        .ok_or_else(|| AppError::Validation("message_id is required".to_string()))?;

    let matched = state.engine.notifications().record_callback(&provider, &message_id).await?;
    Ok(Json(serde_json::json!({ "matched": matched })))
}
