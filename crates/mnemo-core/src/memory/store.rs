//! MemoryRepository trait definition.
//!
//! Storage port for the per-user memory profile. The infrastructure
//! layer (mnemo-infra) implements this trait with SQLite persistence.

use mnemo_types::error::RepositoryError;
use mnemo_types::memory::{MemoryPatch, UserMemoryProfile};

/// Repository trait for per-user memory profile persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MemoryRepository: Send + Sync {
    /// Look up the memory profile for a user. `None` if absent.
    fn get_memory(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserMemoryProfile>, RepositoryError>> + Send;

    /// Insert an empty profile for a user (no facts, zero count, null
    /// watermark).
    ///
    /// Returns `Conflict` when a profile already exists -- callers racing
    /// on first contact should reread instead of failing (the unique
    /// index on `user_id` is the arbiter).
    fn create_memory(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<UserMemoryProfile, RepositoryError>> + Send;

    /// Apply a partial update and return the new row state.
    ///
    /// `updated_at` always advances; `NotFound` if no row exists.
    fn update_memory(
        &self,
        user_id: &str,
        patch: &MemoryPatch,
    ) -> impl std::future::Future<Output = Result<UserMemoryProfile, RepositoryError>> + Send;
}
