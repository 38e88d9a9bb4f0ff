//! Message send/list HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/conversations/{id}/messages - List messages (ascending)
//! - POST /api/v1/conversations/{id}/messages - Send a message, get the reply
//!
//! The send flow: verify ownership -> persist the user message -> build
//! the personalized prompt from memory + history -> complete -> persist
//! the reply -> auto-title on first message -> spawn the detached memory
//! update. The memory update is never awaited; its failure is logged and
//! invisible to the client.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use mnemo_core::chat::prompt::PromptBuilder;
use mnemo_types::chat::ChatMessage;
use mnemo_types::error::ChatError;
use mnemo_types::llm::{CompletionRequest, Message};

use crate::http::error::AppError;
use crate::http::extractors::auth::UserIdentity;
use crate::http::handlers::parse_uuid;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Longest accepted user message, in characters.
const MAX_MESSAGE_CHARS: usize = 10_000;

/// Output token budget for chat replies.
const REPLY_MAX_TOKENS: u32 = 4096;

/// Request body for sending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Response payload for a sent message.
#[derive(Debug, Serialize)]
pub struct SendMessageReply {
    pub reply: String,
    pub message_id: Uuid,
}

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /api/v1/conversations/{id}/messages - List messages for a conversation.
pub async fn list_messages(
    State(state): State<AppState>,
    user: UserIdentity,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let id = parse_uuid(&conversation_id)?;
    let conversation = state.chat_service.get_owned_conversation(&id, &user.0).await?;

    let messages = state
        .chat_service
        .get_messages(&conversation.id, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(messages, request_id, elapsed)))
}

/// POST /api/v1/conversations/{id}/messages - Send a message and get the reply.
pub async fn send_message(
    State(state): State<AppState>,
    user: UserIdentity,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<SendMessageReply>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let id = parse_uuid(&conversation_id)?;
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "Message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let conversation = state.chat_service.get_owned_conversation(&id, &user.0).await?;

    // Persist the user message before anything can fail downstream
    let user_message = state
        .chat_service
        .save_user_message(conversation.id, content.clone())
        .await?;

    // Full conversation history (now including the message just saved)
    let history = state
        .chat_service
        .get_messages(&conversation.id, None, None)
        .await?;

    // Memory is read-only here; the profile update happens in the
    // background after the reply is on its way
    let memory = state.memory_service.get(&user.0).await?;

    let llm_history: Vec<Message> = history
        .iter()
        .map(|m| Message {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();
    let messages = PromptBuilder::build_messages(&llm_history, memory.as_ref(), &content);

    let request = CompletionRequest {
        model: String::new(), // Provider uses its default model
        messages,
        system: None,
        max_tokens: REPLY_MAX_TOKENS,
        temperature: None,
    };

    let response = state.provider.complete(&request).await?;
    if response.content.is_empty() {
        return Err(AppError::Chat(ChatError::EmptyCompletion));
    }

    debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        conversation_id = %conversation.id,
        "Chat completion finished"
    );

    let assistant_message = state
        .chat_service
        .save_assistant_message(conversation.id, response.content.clone())
        .await?;

    // First user message in the conversation: derive a title from it
    if history.len() == 1 {
        state.chat_service.auto_title(&conversation, &content).await?;
    }

    // Fire-and-forget memory update; failures are logged, never surfaced
    let memory_service = state.memory_service.clone();
    let provider = state.provider.clone();
    let user_id = user.0.clone();
    let message_timestamp = user_message.created_at;
    tokio::spawn(async move {
        if let Err(e) = memory_service
            .update_from_message(&provider, &user_id, &content, Some(message_timestamp))
            .await
        {
            warn!(error = %e, user_id = %user_id, "Background memory update failed");
        }
    });

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        SendMessageReply {
            reply: response.content,
            message_id: assistant_message.id,
        },
        request_id,
        elapsed,
    )))
}
