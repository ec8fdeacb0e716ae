//! The streaming channel.
//!
//! Flow:
//! 1. Client connects to `/ws/:session_id` (session must exist and be live)
//! 2. Core sends `connected`
//! 3. Reader loop dispatches inbound `query` / `interrupt_response` frames
//! 4. Writer task drains the per-session progress channel to the socket
//!
//! Closing the channel cancels the active run (checkpoint-or-discard per
//! the configured disconnect policy) and unregisters the progress channel.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use zipsa_domain::event::{InboundMessage, ProgressEvent, ProgressEventKind};
use zipsa_domain::run::Phase;

use crate::runtime::supervisor::{self, QueryInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /ws/:session_id — upgrade to WebSocket.
pub async fn session_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    // The session must exist and be unexpired before the upgrade.
    match state.store.get_session(&session_id) {
        Ok(Some(row)) if !row.is_expired(chrono::Utc::now()) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, session_id, row.user_id))
            .into_response(),
        Ok(_) => (StatusCode::NOT_FOUND, "session not found or expired").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "session lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    user_id: Option<String>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Register the outbound progress channel for this session.
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(state.config.server.channel_depth);
    state.progress.register(&session_id, tx);

    tracing::info!(session_id = %session_id, "channel opened");

    state.progress.emit(
        &session_id,
        ProgressEventKind::Connected {
            session_id: session_id.clone(),
        },
    );

    // A reconnect into a pending review re-surfaces the interrupt.
    if let Some(request) = state.interrupts.pending_request(&session_id) {
        state.progress.emit(
            &session_id,
            ProgressEventKind::WorkflowInterrupted {
                interrupt_data: request.content.clone(),
                interrupted_by: request.interrupted_by.clone(),
                interrupt_type: request.interrupt_type.clone(),
                message: request.message.clone(),
            },
        );
    }

    // Writer task: progress channel → socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(error = %e, "event serialization failed");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader loop.
    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => {
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(inbound) => {
                        handle_inbound(&state, &session_id, user_id.clone(), inbound).await;
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %session_id, error = %e, "ignoring unparseable frame");
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // ── teardown ──────────────────────────────────────────────────
    tracing::info!(session_id = %session_id, "channel closed");
    state.cancel_map.cancel(&session_id);
    state.progress.unregister(&session_id);
    writer.abort();
}

async fn handle_inbound(
    state: &AppState,
    session_id: &str,
    user_id: Option<String>,
    inbound: InboundMessage,
) {
    match inbound {
        InboundMessage::Query {
            query,
            enable_checkpointing,
        } => {
            // One query at a time per session.
            if state.cancel_map.is_running(session_id) {
                state.progress.emit(
                    session_id,
                    ProgressEventKind::Error {
                        error: "session is busy — a query is already in progress".into(),
                        details: None,
                    },
                );
                return;
            }

            if let Err(e) = state
                .store
                .touch_session(session_id, state.config.server.session_ttl_minutes)
            {
                tracing::warn!(error = %e, "session touch failed");
            }

            let input = QueryInput {
                session_id: session_id.to_string(),
                user_id,
                query,
                enable_checkpointing,
            };
            let state = state.clone();
            tokio::spawn(async move {
                supervisor::run_query(state, input).await;
            });
        }

        InboundMessage::InterruptResponse {
            action,
            feedback,
            modifications,
        } => {
            let response = zipsa_domain::interrupt::InterruptResponse {
                action,
                feedback,
                modifications,
            };

            // Primary path: a live run is parked on the oneshot.
            if state.interrupts.deliver(session_id, response.clone()) {
                return;
            }

            // No live waiter. Either a duplicate (ignored) or the paused
            // run didn't survive the process — rehydrate from the latest
            // interrupted checkpoint.
            if state.cancel_map.is_running(session_id) {
                tracing::debug!(session_id, "duplicate interrupt_response ignored");
                return;
            }
            match state.store.latest_checkpoint(session_id) {
                Ok(Some(row)) => {
                    let run = row
                        .state_json()
                        .ok()
                        .and_then(|v| serde_json::from_value::<zipsa_domain::run::RunState>(v).ok());
                    match run {
                        Some(run) if run.phase == Phase::Interrupted => {
                            tracing::info!(session_id, "resuming interrupted run from checkpoint");
                            let state = state.clone();
                            tokio::spawn(async move {
                                supervisor::resume_run(state, run, response).await;
                            });
                        }
                        _ => {
                            tracing::debug!(session_id, "stray interrupt_response ignored");
                        }
                    }
                }
                _ => {
                    tracing::debug!(session_id, "stray interrupt_response ignored");
                }
            }
        }
    }
}
