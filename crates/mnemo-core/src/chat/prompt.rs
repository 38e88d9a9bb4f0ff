//! System prompt builder for personalized conversations.
//!
//! Assembles the message sequence sent to the completion endpoint. Every
//! request gets one of three system prompt variants, selected by a pure
//! string classification of the incoming user message:
//!
//! - self-inquiry with an empty profile: a "still learning about you"
//!   framing that invites the user to share more
//! - self-inquiry with facts on file: a strict prompt that answers from
//!   the stored facts ONLY
//! - anything else: the general conversational prompt with the formatted
//!   fact list embedded

use mnemo_types::llm::{Message, MessageRole};
use mnemo_types::memory::UserMemoryProfile;

/// Whole-message self-inquiry phrasings (matched after lowercasing,
/// trimming, and stripping a trailing question mark).
const SELF_INQUIRY_EXACT: &[&str] = &[
    "who am i",
    "what do you know about me",
    "tell me about myself",
    "describe me",
    "what can you tell me about me",
    "how would you describe me",
    "what have you learned about me",
    "what do you remember about me",
];

/// Looser phrasings matched anywhere inside the message.
const SELF_INQUIRY_CONTAINS: &[&str] = &["who am i?", "tell me about myself", "describe me"];

/// Classify a user message as asking the assistant to describe the user.
///
/// Pure string classification -- no model call.
pub fn is_self_inquiry(message: &str) -> bool {
    let normalized = message.to_lowercase();
    let normalized = normalized.trim();

    let stripped = normalized.strip_suffix('?').unwrap_or(normalized).trim_end();
    if SELF_INQUIRY_EXACT.contains(&stripped) {
        return true;
    }

    SELF_INQUIRY_CONTAINS
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

/// Format the memory profile for embedding in a system prompt.
///
/// A numbered fact list headed by how many messages it was learned from,
/// or a placeholder when nothing is known yet.
pub fn format_memory_for_prompt(memory: Option<&UserMemoryProfile>) -> String {
    let Some(memory) = memory else {
        return "No prior information about the user is available yet.".to_string();
    };
    if memory.facts.is_empty() {
        return "No prior information about the user is available yet.".to_string();
    }

    let facts_list = memory
        .facts
        .iter()
        .enumerate()
        .map(|(idx, fact)| format!("{}. {fact}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "User Profile (learned from {} previous messages):\n{facts_list}",
        memory.message_count
    )
}

/// Builds system prompts and the full message sequence for a chat turn.
pub struct PromptBuilder;

impl PromptBuilder {
    /// System prompt for a normal conversational turn.
    ///
    /// Embeds the formatted fact list and instructs the model to
    /// personalize without inventing facts.
    pub fn conversation_system_prompt(memory: Option<&UserMemoryProfile>) -> String {
        let memory_context = format_memory_for_prompt(memory);

        format!(
            "You are a helpful, friendly AI assistant engaged in a conversation with a user.\n\
            \n\
            {memory_context}\n\
            \n\
            IMPORTANT INSTRUCTIONS:\n\
            1. Use the user profile above to personalize your responses and show that you understand who they are\n\
            2. Reference relevant facts from their profile naturally when appropriate\n\
            3. Continue learning about the user through your conversation\n\
            4. Be conversational, warm, and engaging\n\
            5. If asked about what you know about the user (e.g., \"Who am I?\"), provide a thoughtful summary based ONLY on the profile above\n\
            6. Do NOT invent or assume information that is not in the user profile\n\
            7. If the profile is empty, let the user know you're still learning about them\n\
            \n\
            Remember: You are having an ongoing relationship with this user. Use the profile to make the conversation more personal and meaningful."
        )
    }

    /// System prompt for self-inquiry messages ("Who am I?").
    ///
    /// With facts on file, enforces strict adherence to them; with an
    /// empty profile, frames the answer as an invitation to share more
    /// (friendly, never apologetic).
    pub fn profile_response_prompt(memory: Option<&UserMemoryProfile>) -> String {
        let has_facts = memory.is_some_and(|m| !m.facts.is_empty());
        if !has_facts {
            return "The user is asking about themselves, but you haven't learned anything about them yet.\n\
                \n\
                Respond warmly and let them know:\n\
                - You're just getting to know them\n\
                - You'll learn more about them as you chat\n\
                - Encourage them to share more about themselves\n\
                \n\
                Be friendly and inviting, not apologetic."
                .to_string();
        }

        let memory_context = format_memory_for_prompt(memory);

        format!(
            "The user is asking you to describe them or tell them what you know about them.\n\
            \n\
            {memory_context}\n\
            \n\
            CRITICAL INSTRUCTIONS:\n\
            1. Create a thoughtful, warm personality profile based ONLY on the facts listed above\n\
            2. Do NOT invent, assume, or add any information that is not explicitly in the profile\n\
            3. Organize the information into a coherent narrative (e.g., interests, background, preferences, personality)\n\
            4. Use a warm, conversational tone\n\
            5. Show that you genuinely know and appreciate them as an individual\n\
            6. If certain areas are sparse, acknowledge that you're still learning about those aspects\n\
            \n\
            Your goal: Make the user feel understood and recognized, using ONLY the verified facts you have learned."
        )
    }

    /// Build the full message sequence for a completion request.
    ///
    /// The system prompt variant is selected by classifying `user_message`;
    /// conversation history follows in original order (user/assistant roles
    /// only). The current user message is assumed to already be the last
    /// history entry, so it is never re-appended.
    pub fn build_messages(
        history: &[Message],
        memory: Option<&UserMemoryProfile>,
        user_message: &str,
    ) -> Vec<Message> {
        let system_prompt = if is_self_inquiry(user_message) {
            Self::profile_response_prompt(memory)
        } else {
            Self::conversation_system_prompt(memory)
        };

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message {
            role: MessageRole::System,
            content: system_prompt,
        });

        for msg in history {
            match msg.role {
                MessageRole::User | MessageRole::Assistant => messages.push(msg.clone()),
                MessageRole::System => {}
            }
        }

        messages
    }
}
