//! Memory types for Mnemo.
//!
//! These types model the per-user memory profile: the bounded list of
//! facts learned from conversations plus the processing metadata that
//! drives incremental updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on the fact list after any merge operation.
pub const MAX_PROFILE_FACTS: usize = 50;

/// The per-user memory profile.
///
/// Exactly one row exists per user (enforced by a unique index on
/// `user_id`). `facts` holds at most [`MAX_PROFILE_FACTS`] short strings
/// after any merge; order carries no meaning once a merge has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemoryProfile {
    pub id: Uuid,
    /// Opaque identifier from the external identity provider.
    pub user_id: String,
    /// Learned personality/preference facts.
    pub facts: Vec<String>,
    /// Count of user messages folded into this profile. Never decreases.
    pub message_count: u32,
    /// Watermark: creation time of the newest message already processed.
    /// `None` means no message has ever been processed.
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a memory profile.
///
/// `None` fields are left untouched; `updated_at` always advances.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub facts: Option<Vec<String>>,
    pub message_count: Option<u32>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// A user message not yet folded into the memory profile.
#[derive(Debug, Clone)]
pub struct UnprocessedMessage {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a full profile rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRebuild {
    pub profile: UserMemoryProfile,
    /// How many facts the rebuild added on top of the previous profile
    /// (never negative; consolidation can shrink the list).
    pub facts_added: usize,
}
