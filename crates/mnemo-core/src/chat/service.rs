//! Chat service orchestrating conversation lifecycle and message persistence.
//!
//! ChatService owns the conversation-side business rules: ownership
//! checks, auto-titling from the first user message, and message
//! persistence. Memory updates are NOT its concern -- those belong to
//! `memory::service::MemoryService`, invoked by the request handler.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use mnemo_types::chat::{ChatMessage, Conversation};
use mnemo_types::error::{ChatError, RepositoryError};
use mnemo_types::llm::MessageRole;

use crate::chat::repository::ChatRepository;

/// Maximum length of an auto-generated conversation title.
const AUTO_TITLE_MAX_CHARS: usize = 50;

/// Orchestrates conversation lifecycle and message persistence.
///
/// Generic over `ChatRepository` to keep the clean-architecture split
/// (mnemo-core never depends on mnemo-infra).
pub struct ChatService<C: ChatRepository> {
    chat_repo: C,
}

impl<C: ChatRepository> ChatService<C> {
    /// Create a new chat service with the given repository.
    pub fn new(chat_repo: C) -> Self {
        Self { chat_repo }
    }

    /// Access the chat repository.
    pub fn chat_repo(&self) -> &C {
        &self.chat_repo
    }

    // --- Conversation lifecycle ---

    /// Start a new conversation for a user.
    ///
    /// The title may be supplied up front; otherwise it stays unset until
    /// the first user message triggers auto-titling.
    pub async fn start_conversation(
        &self,
        user_id: &str,
        title: Option<String>,
    ) -> Result<Conversation, RepositoryError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            title,
            created_at: now,
            updated_at: now,
        };

        self.chat_repo.create_conversation(&conversation).await?;
        Ok(conversation)
    }

    /// Get a conversation, verifying it belongs to the given user.
    ///
    /// A missing row and a row owned by someone else are indistinguishable
    /// to the caller -- both are `ConversationNotFound`.
    pub async fn get_owned_conversation(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
    ) -> Result<Conversation, ChatError> {
        let conversation = self.chat_repo.get_conversation(conversation_id).await?;
        match conversation {
            Some(c) if c.user_id == user_id => Ok(c),
            _ => Err(ChatError::ConversationNotFound),
        }
    }

    /// List a user's conversations, most recently active first.
    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        self.chat_repo.list_conversations(user_id, limit, offset).await
    }

    /// Rename a conversation owned by the given user.
    pub async fn rename_conversation(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        title: String,
    ) -> Result<Conversation, ChatError> {
        let mut conversation = self.get_owned_conversation(conversation_id, user_id).await?;
        conversation.title = Some(title);
        conversation.updated_at = Utc::now();
        self.chat_repo.update_conversation(&conversation).await?;
        Ok(conversation)
    }

    /// Set the title from the first user message, if still untitled.
    ///
    /// Takes the first 50 characters of the message, trimmed. A no-op
    /// when the conversation already has a title.
    pub async fn auto_title(
        &self,
        conversation: &Conversation,
        first_message: &str,
    ) -> Result<(), RepositoryError> {
        if conversation.title.is_some() {
            return Ok(());
        }

        let title: String = first_message
            .chars()
            .take(AUTO_TITLE_MAX_CHARS)
            .collect::<String>()
            .trim()
            .to_string();
        if title.is_empty() {
            return Ok(());
        }

        let mut updated = conversation.clone();
        updated.title = Some(title);
        updated.updated_at = Utc::now();
        self.chat_repo.update_conversation(&updated).await?;
        info!(conversation_id = %conversation.id, "Conversation auto-titled");
        Ok(())
    }

    // --- Message persistence ---

    /// Save a user message to a conversation.
    pub async fn save_user_message(
        &self,
        conversation_id: Uuid,
        content: String,
    ) -> Result<ChatMessage, RepositoryError> {
        let message = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id,
            role: MessageRole::User,
            content,
            created_at: Utc::now(),
        };

        self.chat_repo.save_message(&message).await?;
        Ok(message)
    }

    /// Save an assistant reply to a conversation.
    pub async fn save_assistant_message(
        &self,
        conversation_id: Uuid,
        content: String,
    ) -> Result<ChatMessage, RepositoryError> {
        let message = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id,
            role: MessageRole::Assistant,
            content,
            created_at: Utc::now(),
        };

        self.chat_repo.save_message(&message).await?;
        Ok(message)
    }

    /// Get messages for a conversation, ordered by creation time.
    pub async fn get_messages(
        &self,
        conversation_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.chat_repo.get_messages(conversation_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::Mutex;

    use mnemo_types::memory::UnprocessedMessage;

    /// In-memory ChatRepository for service-level tests.
    #[derive(Default)]
    struct InMemoryChatRepository {
        conversations: Mutex<Vec<Conversation>>,
        messages: Mutex<Vec<ChatMessage>>,
    }

    impl ChatRepository for InMemoryChatRepository {
        async fn create_conversation(
            &self,
            conversation: &Conversation,
        ) -> Result<(), RepositoryError> {
            self.conversations.lock().unwrap().push(conversation.clone());
            Ok(())
        }

        async fn get_conversation(
            &self,
            conversation_id: &Uuid,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Ok(self
                .conversations
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == *conversation_id)
                .cloned())
        }

        async fn list_conversations(
            &self,
            user_id: &str,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<Conversation>, RepositoryError> {
            let mut list: Vec<Conversation> = self
                .conversations
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect();
            list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(list)
        }

        async fn update_conversation(
            &self,
            conversation: &Conversation,
        ) -> Result<(), RepositoryError> {
            let mut conversations = self.conversations.lock().unwrap();
            let slot = conversations
                .iter_mut()
                .find(|c| c.id == conversation.id)
                .ok_or(RepositoryError::NotFound)?;
            *slot = conversation.clone();
            Ok(())
        }

        async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn get_messages(
            &self,
            conversation_id: &Uuid,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            let mut list: Vec<ChatMessage> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.conversation_id == *conversation_id)
                .cloned()
                .collect();
            list.sort_by_key(|m| m.created_at);
            Ok(list)
        }

        async fn get_unprocessed_messages(
            &self,
            _user_id: &str,
            _after: Option<DateTime<Utc>>,
        ) -> Result<Vec<UnprocessedMessage>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn service() -> ChatService<InMemoryChatRepository> {
        ChatService::new(InMemoryChatRepository::default())
    }

    #[tokio::test]
    async fn test_start_and_get_owned_conversation() {
        let svc = service();
        let conversation = svc.start_conversation("user_1", None).await.unwrap();

        let found = svc
            .get_owned_conversation(&conversation.id, "user_1")
            .await
            .unwrap();
        assert_eq!(found.id, conversation.id);

        // Another user's lookup is indistinguishable from a missing row
        let denied = svc.get_owned_conversation(&conversation.id, "user_2").await;
        assert!(matches!(denied, Err(ChatError::ConversationNotFound)));
    }

    #[tokio::test]
    async fn test_auto_title_truncates_and_trims() {
        let svc = service();
        let conversation = svc.start_conversation("user_1", None).await.unwrap();

        let long = "a".repeat(80);
        svc.auto_title(&conversation, &long).await.unwrap();

        let titled = svc
            .get_owned_conversation(&conversation.id, "user_1")
            .await
            .unwrap();
        assert_eq!(titled.title.as_deref().map(str::len), Some(50));
    }

    #[tokio::test]
    async fn test_auto_title_preserves_existing() {
        let svc = service();
        let conversation = svc
            .start_conversation("user_1", Some("Chosen".to_string()))
            .await
            .unwrap();

        svc.auto_title(&conversation, "something else").await.unwrap();

        let found = svc
            .get_owned_conversation(&conversation.id, "user_1")
            .await
            .unwrap();
        assert_eq!(found.title.as_deref(), Some("Chosen"));
    }

    #[tokio::test]
    async fn test_messages_ordered_by_creation() {
        let svc = service();
        let conversation = svc.start_conversation("user_1", None).await.unwrap();

        svc.save_user_message(conversation.id, "first".to_string())
            .await
            .unwrap();
        svc.save_assistant_message(conversation.id, "second".to_string())
            .await
            .unwrap();

        let messages = svc.get_messages(&conversation.id, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }
}
