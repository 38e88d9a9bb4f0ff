//! Fact consolidation via LLM with a deterministic fallback.
//!
//! `FactMerger` combines an existing fact list with newly extracted
//! facts into one deduplicated list of at most
//! [`MAX_PROFILE_FACTS`] entries. The preferred path is a single
//! completion call that consolidates overlapping facts; when that call
//! fails or returns something unusable, the merge falls back to exact
//! dedup of the concatenation. The fallback never fails.

use mnemo_types::llm::{CompletionRequest, Message, MessageRole};
use mnemo_types::memory::MAX_PROFILE_FACTS;

use crate::llm::box_provider::BoxLlmProvider;

/// System prompt for the consolidation call.
const MERGE_SYSTEM_PROMPT: &str =
    "You are a memory consolidation system. Always respond with valid JSON arrays only.";

/// Builds the user-turn prompt with both fact lists embedded as JSON.
fn merge_prompt(existing: &[String], incoming: &[String]) -> String {
    let existing_json =
        serde_json::to_string_pretty(existing).unwrap_or_else(|_| "[]".to_string());
    let incoming_json =
        serde_json::to_string_pretty(incoming).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are a memory consolidation system. You will be given:\n\
        1. An existing list of facts about a user\n\
        2. A new list of facts about the same user\n\
        \n\
        Your task:\n\
        - Merge the lists intelligently\n\
        - Remove exact duplicates\n\
        - Consolidate similar or overlapping facts into single, comprehensive facts\n\
        - Keep all unique information\n\
        - Prioritize newer, more specific information over older, vague information\n\
        - Keep the list concise (aim for under {MAX_PROFILE_FACTS} facts total)\n\
        - Maintain chronological relevance (newer facts may update older ones)\n\
        \n\
        Existing facts:\n\
        {existing_json}\n\
        \n\
        New facts:\n\
        {incoming_json}\n\
        \n\
        Return ONLY a valid JSON array of the merged facts. No explanation, just the array."
    )
}

/// Stateless utility for merging fact lists.
pub struct FactMerger;

impl FactMerger {
    /// Merge `incoming` facts into `existing`.
    ///
    /// Identity laws short-circuit without any provider call: an empty
    /// `incoming` returns `existing` unchanged and vice versa. Otherwise
    /// one completion call at temperature 0.2 consolidates both lists;
    /// any failure degrades to [`dedup_concat`]. Never fails.
    #[tracing::instrument(
        name = "merge_facts",
        skip(provider, existing, incoming),
        fields(existing_count = existing.len(), incoming_count = incoming.len())
    )]
    pub async fn merge(
        provider: &BoxLlmProvider,
        existing: Vec<String>,
        incoming: Vec<String>,
    ) -> Vec<String> {
        if incoming.is_empty() {
            return existing;
        }
        if existing.is_empty() {
            return incoming;
        }

        let request = CompletionRequest {
            model: String::new(), // Provider uses its default model
            messages: vec![Message {
                role: MessageRole::User,
                content: merge_prompt(&existing, &incoming),
            }],
            system: Some(MERGE_SYSTEM_PROMPT.to_string()),
            max_tokens: 2048,
            temperature: Some(0.2),
        };

        match provider.complete(&request).await {
            Ok(response) => {
                if let Some(merged) = parse_merged_facts(response.content.trim()) {
                    return merged;
                }
                tracing::warn!("Failed to parse merged facts; using dedup fallback");
                dedup_concat(existing, incoming)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Merge completion failed; using dedup fallback");
                dedup_concat(existing, incoming)
            }
        }
    }
}

/// Parse the consolidation response: a JSON array whose string elements
/// are kept (non-strings and empties dropped), truncated to the cap.
/// `None` when the body is not a JSON array at all.
fn parse_merged_facts(content: &str) -> Option<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(content).ok()?;
    let mut facts: Vec<String> = values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();
    facts.truncate(MAX_PROFILE_FACTS);
    Some(facts)
}

/// Deterministic merge fallback: existing ++ incoming, exact-string
/// dedup preserving first occurrence, truncated to the cap.
pub fn dedup_concat(existing: Vec<String>, incoming: Vec<String>) -> Vec<String> {
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    for fact in existing.into_iter().chain(incoming) {
        if !merged.contains(&fact) {
            merged.push(fact);
        }
    }
    merged.truncate(MAX_PROFILE_FACTS);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::LlmProvider;
    use mnemo_types::llm::{CompletionResponse, LlmError, Usage};

    struct MockLlmProvider {
        response: Result<String, ()>,
    }

    impl MockLlmProvider {
        fn ok(content: &str) -> BoxLlmProvider {
            BoxLlmProvider::new(Self {
                response: Ok(content.to_string()),
            })
        }

        fn failing() -> BoxLlmProvider {
            BoxLlmProvider::new(Self { response: Err(()) })
        }
    }

    impl LlmProvider for MockLlmProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    id: "msg_mock_123".to_string(),
                    content: content.clone(),
                    model: "mock-model".to_string(),
                    usage: Usage::default(),
                }),
                Err(()) => Err(LlmError::Provider {
                    message: "connection reset".to_string(),
                }),
            }
        }
    }

    fn facts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_merge_identity_empty_incoming() {
        // Provider would fail if called; identity law must short-circuit
        let provider = MockLlmProvider::failing();
        let existing = facts(&["Enjoys hiking"]);
        let merged = FactMerger::merge(&provider, existing.clone(), Vec::new()).await;
        assert_eq!(merged, existing);
    }

    #[tokio::test]
    async fn test_merge_identity_empty_existing() {
        let provider = MockLlmProvider::failing();
        let incoming = facts(&["Lives in Seattle"]);
        let merged = FactMerger::merge(&provider, Vec::new(), incoming.clone()).await;
        assert_eq!(merged, incoming);
    }

    #[tokio::test]
    async fn test_merge_uses_model_output() {
        let provider = MockLlmProvider::ok(r#"["Enjoys hiking in the Cascades"]"#);
        let merged = FactMerger::merge(
            &provider,
            facts(&["Enjoys hiking"]),
            facts(&["Hikes in the Cascades"]),
        )
        .await;
        assert_eq!(merged, vec!["Enjoys hiking in the Cascades"]);
    }

    #[tokio::test]
    async fn test_merge_call_failure_falls_back() {
        let provider = MockLlmProvider::failing();
        let merged = FactMerger::merge(
            &provider,
            facts(&["a", "b"]),
            facts(&["b", "c"]),
        )
        .await;
        assert_eq!(merged, facts(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_merge_parse_failure_falls_back() {
        let provider = MockLlmProvider::ok("I merged them for you: a, b, c");
        let merged = FactMerger::merge(
            &provider,
            facts(&["a", "b"]),
            facts(&["b", "c"]),
        )
        .await;
        assert_eq!(merged, facts(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_merge_truncates_model_output_to_cap() {
        let oversized: Vec<String> = (0..80).map(|i| format!("fact {i}")).collect();
        let provider = MockLlmProvider::ok(&serde_json::to_string(&oversized).unwrap());
        let merged = FactMerger::merge(
            &provider,
            facts(&["existing"]),
            facts(&["incoming"]),
        )
        .await;
        assert_eq!(merged.len(), MAX_PROFILE_FACTS);
    }

    #[test]
    fn test_dedup_concat_preserves_first_occurrence() {
        let merged = dedup_concat(facts(&["a", "b"]), facts(&["b", "c", "a"]));
        assert_eq!(merged, facts(&["a", "b", "c"]));
    }

    #[test]
    fn test_dedup_concat_truncates_to_cap() {
        let existing: Vec<String> = (0..40).map(|i| format!("old {i}")).collect();
        let incoming: Vec<String> = (0..40).map(|i| format!("new {i}")).collect();
        let merged = dedup_concat(existing.clone(), incoming);
        assert_eq!(merged.len(), MAX_PROFILE_FACTS);
        // Existing facts keep priority under truncation
        assert_eq!(merged[..40], existing[..]);
    }

    #[test]
    fn test_dedup_concat_is_deterministic() {
        let a = facts(&["x", "y"]);
        let b = facts(&["y", "z"]);
        let first = dedup_concat(a.clone(), b.clone());
        let second = dedup_concat(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_prompt_embeds_both_lists() {
        let prompt = merge_prompt(&facts(&["old fact"]), &facts(&["new fact"]));
        assert!(prompt.contains("old fact"));
        assert!(prompt.contains("new fact"));
        assert!(prompt.contains("Prioritize newer, more specific information"));
        assert!(prompt.contains("under 50 facts"));
    }
}
