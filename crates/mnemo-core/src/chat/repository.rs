//! ChatRepository trait definition.
//!
//! Provides CRUD operations for conversations and messages, plus the
//! incremental message selector used by the memory engine. The
//! infrastructure layer (mnemo-infra) implements this trait with SQLite
//! persistence.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mnemo_types::chat::{ChatMessage, Conversation};
use mnemo_types::error::RepositoryError;
use mnemo_types::memory::UnprocessedMessage;

/// Repository trait for conversation and message persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Create a new conversation.
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a conversation by its unique ID.
    fn get_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// List conversations for a user, most recently active first.
    fn list_conversations(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Update an existing conversation (title, updated_at).
    fn update_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Save a new message. Also advances the parent conversation's
    /// `updated_at` so the conversation list stays sorted by activity.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get messages for a conversation, ordered by created_at ASC.
    fn get_messages(
        &self,
        conversation_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Get user-authored messages across all of a user's conversations
    /// that have not yet been folded into memory, ascending by creation
    /// time.
    ///
    /// When `after` is set, only messages created strictly later are
    /// returned; `None` returns every user message. Assistant messages
    /// are always excluded.
    fn get_unprocessed_messages(
        &self,
        user_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = Result<Vec<UnprocessedMessage>, RepositoryError>> + Send;
}
