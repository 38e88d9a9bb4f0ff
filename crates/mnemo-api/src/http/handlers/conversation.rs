//! Conversation CRUD HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/conversations       - Start a conversation
//! - GET  /api/v1/conversations       - List the user's conversations
//! - PUT  /api/v1/conversations/{id}  - Rename a conversation

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use mnemo_types::chat::Conversation;

use crate::http::error::AppError;
use crate::http::extractors::auth::UserIdentity;
use crate::http::handlers::parse_uuid;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for starting a conversation.
#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    /// Optional initial title; normally left unset and auto-derived from
    /// the first message.
    pub title: Option<String>,
}

/// Query parameters for conversation listing.
#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for renaming a conversation.
#[derive(Debug, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

/// POST /api/v1/conversations - Start a new conversation.
pub async fn start_conversation(
    State(state): State<AppState>,
    user: UserIdentity,
    Json(body): Json<StartConversationRequest>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let title = body.title.filter(|t| !t.trim().is_empty());
    let conversation = state.chat_service.start_conversation(&user.0, title).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(conversation, request_id, elapsed)))
}

/// GET /api/v1/conversations - List the user's conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    user: UserIdentity,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<ApiResponse<Vec<Conversation>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let conversations = state
        .chat_service
        .list_conversations(&user.0, Some(query.limit), Some(query.offset))
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(conversations, request_id, elapsed)))
}

/// PUT /api/v1/conversations/{id} - Rename a conversation.
pub async fn rename_conversation(
    State(state): State<AppState>,
    user: UserIdentity,
    Path(conversation_id): Path<String>,
    Json(body): Json<RenameConversationRequest>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let id = parse_uuid(&conversation_id)?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title must not be empty".to_string()));
    }

    let conversation = state
        .chat_service
        .rename_conversation(&id, &user.0, title.to_string())
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(conversation, request_id, elapsed)))
}
