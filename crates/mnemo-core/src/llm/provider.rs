//! LlmProvider trait definition.
//!
//! This is the abstraction the memory engine and chat handlers talk to.
//! The completion endpoint is a black box: one request in, one text
//! response out. Streaming is intentionally absent -- every caller in
//! this system wants the full response before acting on it.

use mnemo_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM completion backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in mnemo-infra (e.g., `GroqProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "groq").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
