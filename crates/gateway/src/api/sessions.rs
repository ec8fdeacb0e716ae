//! Session bootstrap endpoints.
//!
//! - `POST /sessions/start` — create a session
//! - `GET /sessions/:id` — session info (404 once expired)
//! - `DELETE /sessions/:id` — close a session
//! - `GET /sessions/:id/messages?limit=N` — history, ascending

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> impl IntoResponse {
    match state
        .store
        .create_session(body.user_id.as_deref(), state.config.server.session_ttl_minutes)
    {
        Ok(row) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": row.session_id,
                "created_at": row.created_at,
                "expires_at": row.expires_at,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "session creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&session_id) {
        Ok(Some(row)) if !row.is_expired(chrono::Utc::now()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": row.session_id,
                "user_id": row.user_id,
                "created_at": row.created_at,
                "expires_at": row.expires_at,
                "last_activity": row.last_activity,
            })),
        )
            .into_response(),
        Ok(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found or expired" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    // Cancel any in-flight run and drop dependent registrations.
    state.cancel_map.cancel(&session_id);
    state.interrupts.remove(&session_id);
    state.reuse.remove_session(&session_id);

    match state.store.delete_session(&session_id) {
        Ok(found) => {
            let status = if found {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            (status, Json(serde_json::json!({ "ok": found }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    match state.store.list_messages(&session_id, query.limit) {
        Ok(messages) => {
            let rows: Vec<serde_json::Value> = messages
                .into_iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.id,
                        "role": m.role,
                        "content": m.content,
                        "structured_data": m.structured_data,
                        "created_at": m.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, Json(serde_json::json!(rows))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
