//! Infrastructure implementations for Mnemo.
//!
//! SQLite persistence (sqlx, split reader/writer pools) for the
//! repository traits defined in `mnemo-core`, and the Groq
//! OpenAI-compatible LLM provider.

pub mod llm;
pub mod sqlite;
