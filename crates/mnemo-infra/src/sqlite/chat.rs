//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `mnemo-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reader pool for
//! SELECTs, writer pool for mutations.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use mnemo_core::chat::repository::ChatRepository;
use mnemo_types::chat::{ChatMessage, Conversation};
use mnemo_types::error::RepositoryError;
use mnemo_types::llm::MessageRole;
use mnemo_types::memory::UnprocessedMessage;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain Conversation.
struct ConversationRow {
    id: String,
    user_id: String,
    title: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;

        Ok(Conversation {
            id,
            user_id: self.user_id,
            title: self.title,
            created_at,
            updated_at,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id = Uuid::parse_str(&self.conversation_id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(ChatMessage {
            id,
            conversation_id,
            role,
            content: self.content,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (id, user_id, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            ConversationRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_conversation()
        })
        .transpose()
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut sql = String::from(
            "SELECT * FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
        );

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation_row = ConversationRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            conversations.push(conversation_row.into_conversation()?);
        }

        Ok(conversations)
    }

    async fn update_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&conversation.title)
        .bind(format_datetime(&conversation.updated_at))
        .bind(conversation.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Keep the conversation list sorted by activity
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(format_datetime(&message.created_at))
            .bind(message.conversation_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_messages(
        &self,
        conversation_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut sql = String::from(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC",
        );

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let rows = sqlx::query(&sql)
            .bind(conversation_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row = ChatMessageRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }

    async fn get_unprocessed_messages(
        &self,
        user_id: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<UnprocessedMessage>, RepositoryError> {
        let rows = match after {
            Some(after) => {
                sqlx::query(
                    r#"SELECT m.id, m.content, m.created_at
                       FROM messages m
                       INNER JOIN conversations c ON m.conversation_id = c.id
                       WHERE c.user_id = ? AND m.role = 'user' AND m.created_at > ?
                       ORDER BY m.created_at ASC"#,
                )
                .bind(user_id)
                .bind(format_datetime(&after))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    r#"SELECT m.id, m.content, m.created_at
                       FROM messages m
                       INNER JOIN conversations c ON m.conversation_id = c.id
                       WHERE c.user_id = ? AND m.role = 'user'
                       ORDER BY m.created_at ASC"#,
                )
                .bind(user_id)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let content: String = row
                .try_get("content")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            messages.push(UnprocessedMessage {
                id: Uuid::parse_str(&id)
                    .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?,
                content,
                created_at: parse_datetime(&created_at)?,
            });
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_conversation(user_id: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_message(
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_conversation() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let conversation = make_conversation("user_1");
        repo.create_conversation(&conversation).await.unwrap();

        let found = repo.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, "user_1");
        assert!(found.title.is_none());

        let missing = repo.get_conversation(&Uuid::now_v7()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_conversations_most_recent_first() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let mut older = make_conversation("user_1");
        older.updated_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = make_conversation("user_1");
        let other_user = make_conversation("user_2");

        repo.create_conversation(&older).await.unwrap();
        repo.create_conversation(&newer).await.unwrap();
        repo.create_conversation(&other_user).await.unwrap();

        let list = repo.list_conversations("user_1", None, None).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.id);
        assert_eq!(list[1].id, older.id);
    }

    #[tokio::test]
    async fn test_update_conversation_title() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let mut conversation = make_conversation("user_1");
        repo.create_conversation(&conversation).await.unwrap();

        conversation.title = Some("Hiking plans".to_string());
        conversation.updated_at = Utc::now();
        repo.update_conversation(&conversation).await.unwrap();

        let found = repo.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("Hiking plans"));
    }

    #[tokio::test]
    async fn test_update_missing_conversation_is_not_found() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let conversation = make_conversation("user_1");
        let result = repo.update_conversation(&conversation).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_messages_roundtrip_in_order() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let conversation = make_conversation("user_1");
        repo.create_conversation(&conversation).await.unwrap();

        let t0 = Utc::now();
        repo.save_message(&make_message(conversation.id, MessageRole::User, "hi", t0))
            .await
            .unwrap();
        repo.save_message(&make_message(
            conversation.id,
            MessageRole::Assistant,
            "hello!",
            t0 + chrono::Duration::seconds(1),
        ))
        .await
        .unwrap();

        let messages = repo.get_messages(&conversation.id, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_save_message_bumps_conversation_activity() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let mut conversation = make_conversation("user_1");
        conversation.updated_at = Utc::now() - chrono::Duration::hours(1);
        conversation.created_at = conversation.updated_at;
        repo.create_conversation(&conversation).await.unwrap();

        let message_at = Utc::now();
        repo.save_message(&make_message(conversation.id, MessageRole::User, "hi", message_at))
            .await
            .unwrap();

        let found = repo.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(found.updated_at, message_at);
    }

    #[tokio::test]
    async fn test_unprocessed_filters_role_and_watermark() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let conversation = make_conversation("user_1");
        repo.create_conversation(&conversation).await.unwrap();

        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);
        let t3 = t1 + chrono::Duration::seconds(2);

        repo.save_message(&make_message(conversation.id, MessageRole::User, "one", t1))
            .await
            .unwrap();
        repo.save_message(&make_message(
            conversation.id,
            MessageRole::Assistant,
            "reply",
            t2,
        ))
        .await
        .unwrap();
        repo.save_message(&make_message(conversation.id, MessageRole::User, "two", t3))
            .await
            .unwrap();

        // No watermark: every user message, assistant excluded
        let all = repo.get_unprocessed_messages("user_1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "one");
        assert_eq!(all[1].content, "two");

        // Watermark at t1: only strictly newer user messages
        let newer = repo.get_unprocessed_messages("user_1", Some(t1)).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].content, "two");

        // Another user sees nothing
        let other = repo.get_unprocessed_messages("user_2", None).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_unprocessed_spans_conversations() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool);

        let first = make_conversation("user_1");
        let second = make_conversation("user_1");
        repo.create_conversation(&first).await.unwrap();
        repo.create_conversation(&second).await.unwrap();

        let t1 = Utc::now();
        repo.save_message(&make_message(first.id, MessageRole::User, "in first", t1))
            .await
            .unwrap();
        repo.save_message(&make_message(
            second.id,
            MessageRole::User,
            "in second",
            t1 + chrono::Duration::seconds(1),
        ))
        .await
        .unwrap();

        let all = repo.get_unprocessed_messages("user_1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "in first");
        assert_eq!(all[1].content, "in second");
    }
}
