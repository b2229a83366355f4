//! Chat HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/chat/sessions - Caller's inbox, most recent first
//! - GET  /api/v1/chat/history  - One page of an order-scoped conversation
//! - POST /api/v1/chat/read     - Mark the caller's messages in a session read
//! - POST /api/v1/chat/messages - Send a message and push it to both sides

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use serde::Serialize;
use uuid::Uuid;

use chowline_core::realtime::fanout::{fan_out, push_rejection};
use chowline_types::chat::{
    HistoryPage, HistoryQuery, MarkRead, MessageView, SendMessage, SessionSummary,
};
use chowline_types::role::CounterpartRole;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Response body of a successful send.
#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub message: MessageView,
    /// The sender's updated view of the session.
    pub session: Option<SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

/// Response body of a mark-read request.
#[derive(Debug, Serialize)]
pub struct ReadReceipt {
    pub updated: u64,
}

/// GET /api/v1/chat/sessions - List the caller's sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sessions = state.chat_service.list_sessions(&principal).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(sessions, request_id, elapsed)
        .with_link("self", "/api/v1/chat/sessions");

    Ok(Json(resp))
}

/// GET /api/v1/chat/history - Load one page of history.
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<HistoryPage>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let page = state.chat_service.load_history(&principal, &query).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let mut resp = ApiResponse::success(page, request_id, elapsed);
    if let Some(next) = resp
        .data
        .as_ref()
        .and_then(|p| p.next_before_id)
        .and_then(|cursor| next_history_link(&query, cursor))
    {
        resp = resp.with_link("next", &next);
    }

    Ok(Json(resp))
}

/// Link to the page before `cursor`, echoing the peer in canonical form.
fn next_history_link(query: &HistoryQuery, cursor: i64) -> Option<String> {
    let order_id = query.order_id?;
    let mut next = format!("/api/v1/chat/history?order_id={order_id}&before_id={cursor}");
    let peer_role = query
        .peer_role
        .as_deref()
        .and_then(|role| role.parse::<CounterpartRole>().ok());
    if let (Some(peer_id), Some(peer_role)) = (query.peer_id, peer_role) {
        next.push_str(&format!("&peer_id={peer_id}&peer_role={}", peer_role.as_str()));
    }
    if let Some(size) = query.size {
        next.push_str(&format!("&size={size}"));
    }
    Some(next)
}

/// POST /api/v1/chat/read - Mark the caller's unread messages in a session read.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<MarkRead>,
) -> Result<Json<ApiResponse<ReadReceipt>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let updated = state.chat_service.mark_read(&principal, &request).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        ReadReceipt { updated },
        request_id,
        elapsed,
    )))
}

/// POST /api/v1/chat/messages - Send a message.
///
/// The message is stored first, then pushed to both sides' live connections.
/// A rejected send is also pushed back to the sender as an error frame.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<SendMessage>,
) -> Result<Json<ApiResponse<SentMessage>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let client_message_id = request.client_message_id.clone();

    let package = match state.chat_service.send(&principal, request).await {
        Ok(package) => package,
        Err(err) => {
            push_rejection(
                &state.hub,
                &principal.username,
                &err,
                client_message_id.as_deref(),
            )
            .await;
            return Err(err.into());
        }
    };

    fan_out(&state.hub, &package, client_message_id.as_deref()).await;

    let elapsed = start.elapsed().as_millis() as u64;
    let body = SentMessage {
        message: package.message,
        session: package.sender_session,
        client_message_id,
    };

    Ok(Json(ApiResponse::success(body, request_id, elapsed)))
}
