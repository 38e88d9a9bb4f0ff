//! Fact extraction via LLM.
//!
//! `FactExtractor` issues a single completion call with a constrained
//! prompt contract (strict JSON array of short fact strings) and parses
//! the result fail-soft: malformed JSON, a non-array result, or
//! non-string elements all yield an empty list, never an error the
//! caller has to handle.

use mnemo_types::llm::{CompletionRequest, LlmError, Message, MessageRole};

use crate::llm::box_provider::BoxLlmProvider;

/// Separator line placed between messages when a batch is extracted in
/// one call, so the model can distinguish message boundaries.
pub const BATCH_SEPARATOR: &str = "\n---\n";

/// System prompt for the extraction call.
const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a fact extraction system. Always respond with valid JSON arrays only.";

/// Builds the user-turn prompt embedding the (escaped) message text.
///
/// The extraction policy lives here: only facts clearly stated or
/// strongly implied, no speculative inference, opinions recorded as held
/// rather than as true, one sentence per fact.
fn extraction_prompt(text: &str) -> String {
    let escaped = text.replace('"', "\\\"");
    format!(
        "You are a fact extraction system. Analyze the user's message and extract ONLY factual or consistent personality-relevant information about the user.\n\
        \n\
        Extract information about:\n\
        - Personal preferences (likes/dislikes)\n\
        - Hobbies and interests\n\
        - Professional background or skills\n\
        - Personal background (location, family, etc.)\n\
        - Communication style or personality traits\n\
        - Goals or aspirations\n\
        - Values or beliefs\n\
        - Emotional tendencies\n\
        - Specific facts they mention about themselves\n\
        \n\
        CRITICAL RULES:\n\
        1. Extract ONLY facts that are clearly stated or strongly implied\n\
        2. Do NOT make assumptions or inferences beyond what's stated\n\
        3. Do NOT extract opinions about topics (extract that they HAVE those opinions)\n\
        4. Keep facts concise (one sentence each)\n\
        5. Return a JSON array of strings\n\
        6. If nothing relevant is found, return an empty array []\n\
        \n\
        User message: \"{escaped}\"\n\
        \n\
        Return ONLY a valid JSON array of fact strings, nothing else."
    )
}

/// Stateless utility for extracting user facts from message text.
pub struct FactExtractor;

impl FactExtractor {
    /// Extract facts from a batch of user-authored text.
    ///
    /// One completion call at temperature 0.3 (favoring deterministic
    /// extraction). The `Err` arm carries provider failures for the
    /// caller to log; every output-shape violation is folded into
    /// `Ok(vec![])` here.
    #[tracing::instrument(name = "extract_facts", skip(provider, text), fields(text_len = text.len()))]
    pub async fn extract(
        provider: &BoxLlmProvider,
        text: &str,
    ) -> Result<Vec<String>, LlmError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = CompletionRequest {
            model: String::new(), // Provider uses its default model
            messages: vec![Message {
                role: MessageRole::User,
                content: extraction_prompt(text),
            }],
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            max_tokens: 1024,
            temperature: Some(0.3),
        };

        let response = provider.complete(&request).await?;
        Ok(parse_fact_array(response.content.trim()))
    }
}

/// Parse a completion body as a JSON array of non-empty strings.
///
/// Anything else -- parse failure, non-array, mixed element types --
/// degrades to an empty list with a warning.
fn parse_fact_array(content: &str) -> Vec<String> {
    let parsed: Result<Vec<serde_json::Value>, _> = serde_json::from_str(content);
    match parsed {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                content_preview = &content[..content.len().min(200)],
                "Failed to parse fact extraction JSON; returning empty result"
            );
            Vec::new()
        }
    }
}
