//! Configuration and defaults for the Groq provider.
//!
//! Groq speaks the OpenAI chat completions protocol, so the provider is
//! a thin configuration of an OpenAI-compatible client.

use secrecy::SecretString;

/// Default chat model used when a request leaves the model unset.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Groq's OpenAI-compatible base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Configuration for a [`super::GroqProvider`].
pub struct GroqConfig {
    /// Base URL for the API.
    pub base_url: String,
    /// API key for authentication.
    pub api_key: SecretString,
    /// Model identifier used when requests don't specify one.
    pub model: String,
}

/// Groq default configuration.
pub fn groq_defaults(api_key: SecretString, model: &str) -> GroqConfig {
    GroqConfig {
        base_url: GROQ_BASE_URL.into(),
        api_key,
        model: model.into(),
    }
}
