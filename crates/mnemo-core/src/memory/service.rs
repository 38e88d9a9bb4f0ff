//! Memory update orchestrator.
//!
//! `MemoryService` runs the pipeline invoked after each user message
//! (fetch-or-create -> dedup check -> extract -> merge -> persist) and
//! the operator-triggered full rebuild. Extraction and merge failures
//! degrade gracefully inside the pipeline; only persistence errors
//! propagate to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use mnemo_types::error::RepositoryError;
use mnemo_types::memory::{MemoryPatch, ProfileRebuild, UserMemoryProfile};

use crate::chat::repository::ChatRepository;
use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::extractor::{BATCH_SEPARATOR, FactExtractor};
use crate::memory::merger::FactMerger;
use crate::memory::store::MemoryRepository;

/// Messages per extraction call during a full rebuild.
const REBUILD_BATCH_SIZE: usize = 10;

/// Pause between rebuild batches. Rate-limit courtesy toward the
/// completion provider, not a correctness requirement.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Orchestrates memory profile updates.
///
/// Generic over `MemoryRepository` and `ChatRepository`; the LLM
/// provider is passed per call so detached background tasks can share
/// the application-wide instance.
pub struct MemoryService<M: MemoryRepository, C: ChatRepository> {
    memory_repo: M,
    chat_repo: C,
}

impl<M: MemoryRepository, C: ChatRepository> MemoryService<M, C> {
    /// Create a new memory service with the given repositories.
    pub fn new(memory_repo: M, chat_repo: C) -> Self {
        Self {
            memory_repo,
            chat_repo,
        }
    }

    /// Look up a user's memory profile without creating one.
    pub async fn get(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMemoryProfile>, RepositoryError> {
        self.memory_repo.get_memory(user_id).await
    }

    /// Get the user's memory profile, creating an empty one if absent.
    ///
    /// Two concurrent first-contact requests can both observe "no row"
    /// and both insert; the unique index turns the loser's insert into a
    /// `Conflict`, which is resolved by rereading the winner's row.
    pub async fn get_or_create(
        &self,
        user_id: &str,
    ) -> Result<UserMemoryProfile, RepositoryError> {
        if let Some(memory) = self.memory_repo.get_memory(user_id).await? {
            return Ok(memory);
        }

        match self.memory_repo.create_memory(user_id).await {
            Ok(memory) => Ok(memory),
            Err(RepositoryError::Conflict(_)) => self
                .memory_repo
                .get_memory(user_id)
                .await?
                .ok_or(RepositoryError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Fold a single new user message into the memory profile.
    ///
    /// Invoked after the message is durably saved, typically from a
    /// detached background task. When `message_timestamp` is at or
    /// before the stored watermark the message has already been
    /// accounted for and the profile is returned unchanged.
    ///
    /// Extraction failures count as "no new facts"; merge failures fall
    /// back to deterministic dedup. Only persistence errors surface.
    #[tracing::instrument(
        name = "update_memory",
        skip(self, provider, message),
        fields(user_id = %user_id, message_len = message.len())
    )]
    pub async fn update_from_message(
        &self,
        provider: &BoxLlmProvider,
        user_id: &str,
        message: &str,
        message_timestamp: Option<DateTime<Utc>>,
    ) -> Result<UserMemoryProfile, RepositoryError> {
        let memory = self.get_or_create(user_id).await?;

        if let (Some(msg_time), Some(last_processed)) =
            (message_timestamp, memory.last_processed_at)
        {
            if msg_time <= last_processed {
                debug!(user_id = %user_id, "Skipping already processed message");
                return Ok(memory);
            }
        }

        let new_facts = match FactExtractor::extract(provider, message).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(error = %e, "Fact extraction failed; treating as zero facts");
                Vec::new()
            }
        };

        let processed_at = message_timestamp.unwrap_or_else(Utc::now);

        if new_facts.is_empty() {
            // No new facts: advance the watermark and count only
            let patch = MemoryPatch {
                message_count: Some(memory.message_count + 1),
                last_processed_at: Some(processed_at),
                ..Default::default()
            };
            return self.memory_repo.update_memory(user_id, &patch).await;
        }

        let merged = FactMerger::merge(provider, memory.facts, new_facts).await;

        let patch = MemoryPatch {
            facts: Some(merged),
            message_count: Some(memory.message_count + 1),
            last_processed_at: Some(processed_at),
        };
        self.memory_repo.update_memory(user_id, &patch).await
    }

    /// Rebuild the profile from every message not yet folded in.
    ///
    /// Fetches unprocessed user messages (all of them when the watermark
    /// is null), extracts facts in batches of [`REBUILD_BATCH_SIZE`]
    /// with a short pause between batches, merges once at the end, and
    /// advances the watermark to the last processed message. A no-op
    /// returning the current profile when nothing is pending.
    #[tracing::instrument(name = "rebuild_profile", skip(self, provider), fields(user_id = %user_id))]
    pub async fn rebuild_profile(
        &self,
        provider: &BoxLlmProvider,
        user_id: &str,
    ) -> Result<ProfileRebuild, RepositoryError> {
        let memory = self.get_or_create(user_id).await?;

        let pending = self
            .chat_repo
            .get_unprocessed_messages(user_id, memory.last_processed_at)
            .await?;

        if pending.is_empty() {
            debug!(user_id = %user_id, "No unprocessed messages");
            return Ok(ProfileRebuild {
                profile: memory,
                facts_added: 0,
            });
        }

        info!(
            user_id = %user_id,
            count = pending.len(),
            "Processing unprocessed messages"
        );

        let mut extracted = Vec::new();
        for (batch_index, batch) in pending.chunks(REBUILD_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }

            let batch_text = batch
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(BATCH_SEPARATOR);

            match FactExtractor::extract(provider, &batch_text).await {
                Ok(facts) => extracted.extend(facts),
                Err(e) => warn!(error = %e, batch_index, "Batch extraction failed; skipping batch"),
            }
        }

        let previous_count = memory.facts.len();
        let merged = FactMerger::merge(provider, memory.facts, extracted).await;
        let facts_added = merged.len().saturating_sub(previous_count);

        // pending is non-empty here, so last() is always present
        let last_processed_at = pending.last().map(|m| m.created_at).unwrap_or_else(Utc::now);

        let patch = MemoryPatch {
            facts: Some(merged),
            message_count: Some(memory.message_count + pending.len() as u32),
            last_processed_at: Some(last_processed_at),
        };
        let profile = self.memory_repo.update_memory(user_id, &patch).await?;

        Ok(ProfileRebuild {
            profile,
            facts_added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    use mnemo_types::chat::{ChatMessage, Conversation};
    use mnemo_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};
    use mnemo_types::memory::UnprocessedMessage;

    use crate::llm::provider::LlmProvider;

    // --- Mock provider ---

    /// Returns a fixed extraction response on every call; counts calls.
    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        /// Pops responses front-to-back; repeats the last one when exhausted.
        fn new(responses: &[&str]) -> BoxLlmProvider {
            BoxLlmProvider::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let content = if responses.len() > 1 {
                responses.pop().unwrap()
            } else {
                responses.last().cloned().unwrap_or_else(|| "[]".to_string())
            };
            Ok(CompletionResponse {
                id: "msg_scripted".to_string(),
                content,
                model: "mock-model".to_string(),
                usage: Usage::default(),
            })
        }
    }

    // --- Mock repositories ---

    #[derive(Default)]
    struct InMemoryMemoryRepository {
        profile: Mutex<Option<UserMemoryProfile>>,
    }

    impl MemoryRepository for InMemoryMemoryRepository {
        async fn get_memory(
            &self,
            user_id: &str,
        ) -> Result<Option<UserMemoryProfile>, RepositoryError> {
            Ok(self
                .profile
                .lock()
                .unwrap()
                .clone()
                .filter(|p| p.user_id == user_id))
        }

        async fn create_memory(
            &self,
            user_id: &str,
        ) -> Result<UserMemoryProfile, RepositoryError> {
            let mut slot = self.profile.lock().unwrap();
            if slot.is_some() {
                return Err(RepositoryError::Conflict(format!(
                    "memory profile already exists for user '{user_id}'"
                )));
            }
            let now = Utc::now();
            let profile = UserMemoryProfile {
                id: Uuid::now_v7(),
                user_id: user_id.to_string(),
                facts: Vec::new(),
                message_count: 0,
                last_processed_at: None,
                created_at: now,
                updated_at: now,
            };
            *slot = Some(profile.clone());
            Ok(profile)
        }

        async fn update_memory(
            &self,
            _user_id: &str,
            patch: &MemoryPatch,
        ) -> Result<UserMemoryProfile, RepositoryError> {
            let mut slot = self.profile.lock().unwrap();
            let profile = slot.as_mut().ok_or(RepositoryError::NotFound)?;
            if let Some(facts) = &patch.facts {
                profile.facts = facts.clone();
            }
            if let Some(count) = patch.message_count {
                profile.message_count = count;
            }
            if let Some(at) = patch.last_processed_at {
                profile.last_processed_at = Some(at);
            }
            profile.updated_at = Utc::now();
            Ok(profile.clone())
        }
    }

    #[derive(Default)]
    struct StubChatRepository {
        unprocessed: Vec<UnprocessedMessage>,
    }

    impl ChatRepository for StubChatRepository {
        async fn create_conversation(
            &self,
            _conversation: &Conversation,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn get_conversation(
            &self,
            _conversation_id: &Uuid,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Ok(None)
        }

        async fn list_conversations(
            &self,
            _user_id: &str,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<Conversation>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn update_conversation(
            &self,
            _conversation: &Conversation,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn save_message(&self, _message: &ChatMessage) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn get_messages(
            &self,
            _conversation_id: &Uuid,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn get_unprocessed_messages(
            &self,
            _user_id: &str,
            after: Option<DateTime<Utc>>,
        ) -> Result<Vec<UnprocessedMessage>, RepositoryError> {
            Ok(self
                .unprocessed
                .iter()
                .filter(|m| after.is_none_or(|t| m.created_at > t))
                .cloned()
                .collect())
        }
    }

    fn service(
        unprocessed: Vec<UnprocessedMessage>,
    ) -> MemoryService<InMemoryMemoryRepository, StubChatRepository> {
        MemoryService::new(
            InMemoryMemoryRepository::default(),
            StubChatRepository { unprocessed },
        )
    }

    fn unprocessed(content: &str, created_at: DateTime<Utc>) -> UnprocessedMessage {
        UnprocessedMessage {
            id: Uuid::now_v7(),
            content: content.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_creates_empty_profile() {
        let svc = service(Vec::new());
        let profile = svc.get_or_create("user_1").await.unwrap();
        assert!(profile.facts.is_empty());
        assert_eq!(profile.message_count, 0);
        assert!(profile.last_processed_at.is_none());
    }

    #[tokio::test]
    async fn test_first_message_end_to_end() {
        let provider = ScriptedProvider::new(&[
            r#"["Enjoys hiking", "Works as a software engineer", "Lives in Seattle"]"#,
        ]);
        let svc = service(Vec::new());
        let timestamp = Utc::now();

        let profile = svc
            .update_from_message(
                &provider,
                "user_1",
                "I love hiking and I'm a software engineer in Seattle.",
                Some(timestamp),
            )
            .await
            .unwrap();

        assert_eq!(profile.message_count, 1);
        assert_eq!(profile.facts.len(), 3);
        assert_eq!(profile.last_processed_at, Some(timestamp));
    }

    #[tokio::test]
    async fn test_reprocessing_same_timestamp_is_idempotent() {
        let provider = ScriptedProvider::new(&[r#"["Enjoys hiking"]"#]);
        let svc = service(Vec::new());
        let timestamp = Utc::now();

        let first = svc
            .update_from_message(&provider, "user_1", "I love hiking", Some(timestamp))
            .await
            .unwrap();

        // Second call with the same timestamp hits the watermark guard
        let second = svc
            .update_from_message(&provider, "user_1", "I love hiking", Some(timestamp))
            .await
            .unwrap();

        assert_eq!(second.facts, first.facts);
        assert_eq!(second.message_count, first.message_count);
        assert_eq!(second.last_processed_at, first.last_processed_at);
    }

    #[tokio::test]
    async fn test_no_new_facts_advances_watermark_only() {
        let provider = ScriptedProvider::new(&["[]"]);
        let svc = service(Vec::new());
        let timestamp = Utc::now();

        let profile = svc
            .update_from_message(&provider, "user_1", "ok, thanks!", Some(timestamp))
            .await
            .unwrap();

        assert!(profile.facts.is_empty());
        assert_eq!(profile.message_count, 1);
        assert_eq!(profile.last_processed_at, Some(timestamp));
    }

    #[tokio::test]
    async fn test_extraction_failure_counts_as_zero_facts() {
        struct FailingProvider;
        impl LlmProvider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            async fn complete(
                &self,
                _request: &CompletionRequest,
            ) -> Result<CompletionResponse, LlmError> {
                Err(LlmError::Provider {
                    message: "boom".to_string(),
                })
            }
        }

        let provider = BoxLlmProvider::new(FailingProvider);
        let svc = service(Vec::new());

        let profile = svc
            .update_from_message(&provider, "user_1", "I love hiking", None)
            .await
            .unwrap();

        assert!(profile.facts.is_empty());
        assert_eq!(profile.message_count, 1);
        assert!(profile.last_processed_at.is_some());
    }

    #[tokio::test]
    async fn test_get_or_create_conflict_rereads_existing() {
        // Simulates losing the first-contact race: the initial lookup sees
        // no row, the insert conflicts with the winner's, and the reread
        // returns the winner's row.
        struct RacyMemoryRepository {
            winner: UserMemoryProfile,
            first_get_done: AtomicUsize,
        }

        impl MemoryRepository for RacyMemoryRepository {
            async fn get_memory(
                &self,
                _user_id: &str,
            ) -> Result<Option<UserMemoryProfile>, RepositoryError> {
                if self.first_get_done.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok(None);
                }
                Ok(Some(self.winner.clone()))
            }

            async fn create_memory(
                &self,
                user_id: &str,
            ) -> Result<UserMemoryProfile, RepositoryError> {
                Err(RepositoryError::Conflict(format!(
                    "memory profile already exists for user '{user_id}'"
                )))
            }

            async fn update_memory(
                &self,
                _user_id: &str,
                _patch: &MemoryPatch,
            ) -> Result<UserMemoryProfile, RepositoryError> {
                unreachable!("not exercised")
            }
        }

        let now = Utc::now();
        let repo = RacyMemoryRepository {
            winner: UserMemoryProfile {
                id: Uuid::now_v7(),
                user_id: "user_1".to_string(),
                facts: vec!["existing fact".to_string()],
                message_count: 4,
                last_processed_at: Some(now),
                created_at: now,
                updated_at: now,
            },
            first_get_done: AtomicUsize::new(0),
        };

        let svc = MemoryService::new(repo, StubChatRepository::default());
        let profile = svc.get_or_create("user_1").await.unwrap();
        assert_eq!(profile.facts, vec!["existing fact"]);
        assert_eq!(profile.message_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_advances_watermark_and_count() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);
        let t3 = t1 + chrono::Duration::seconds(2);

        let provider = ScriptedProvider::new(&[r#"["Enjoys hiking", "Owns a dog"]"#]);
        let svc = service(vec![
            unprocessed("I love hiking", t1),
            unprocessed("my dog is called Juno", t2),
            unprocessed("thanks!", t3),
        ]);

        let rebuild = svc.rebuild_profile(&provider, "user_1").await.unwrap();

        assert_eq!(rebuild.profile.message_count, 3);
        assert_eq!(rebuild.profile.last_processed_at, Some(t3));
        assert_eq!(rebuild.facts_added, 2);
        assert_eq!(rebuild.profile.facts.len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_with_nothing_pending_is_noop() {
        let provider = ScriptedProvider::new(&[r#"["should never be used"]"#]);
        let svc = service(Vec::new());

        let rebuild = svc.rebuild_profile(&provider, "user_1").await.unwrap();
        assert_eq!(rebuild.facts_added, 0);
        assert!(rebuild.profile.facts.is_empty());
        assert_eq!(rebuild.profile.message_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_batches_large_backlogs() {
        // 23 messages -> 3 extraction batches, then one merge pass
        let base = Utc::now();
        let backlog: Vec<UnprocessedMessage> = (0..23)
            .map(|i| unprocessed(&format!("message {i}"), base + chrono::Duration::seconds(i)))
            .collect();
        let last_at = backlog.last().unwrap().created_at;

        let provider = ScriptedProvider::new(&[
            r#"["fact one"]"#,
            r#"["fact two"]"#,
            r#"["fact three"]"#,
        ]);
        let svc = service(backlog);

        let rebuild = svc.rebuild_profile(&provider, "user_1").await.unwrap();
        assert_eq!(rebuild.profile.message_count, 23);
        assert_eq!(rebuild.profile.last_processed_at, Some(last_at));
        // One extraction per batch; merge into an empty profile is identity
        assert_eq!(
            rebuild.profile.facts,
            vec!["fact one", "fact two", "fact three"]
        );
    }
}
