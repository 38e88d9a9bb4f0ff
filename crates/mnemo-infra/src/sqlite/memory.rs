//! SQLite memory repository implementation.
//!
//! Implements `MemoryRepository` from `mnemo-core` using sqlx with split
//! read/write pools. The `facts` column stores the JSON-serialized fact
//! array; the unique index on `user_id` is the arbiter for the
//! get-or-create race (a duplicate insert surfaces as `Conflict`).

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use mnemo_core::memory::store::MemoryRepository;
use mnemo_types::error::RepositoryError;
use mnemo_types::memory::{MemoryPatch, UserMemoryProfile};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MemoryRepository`.
pub struct SqliteMemoryRepository {
    pool: DatabasePool,
}

impl SqliteMemoryRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMemoryProfile>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM user_memory WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            UserMemoryRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_profile()
        })
        .transpose()
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain UserMemoryProfile.
struct UserMemoryRow {
    id: String,
    user_id: String,
    facts: String,
    message_count: i64,
    last_processed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl UserMemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            facts: row.try_get("facts")?,
            message_count: row.try_get("message_count")?,
            last_processed_at: row.try_get("last_processed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_profile(self) -> Result<UserMemoryProfile, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid memory id: {e}")))?;
        let facts: Vec<String> = serde_json::from_str(&self.facts)
            .map_err(|e| RepositoryError::Query(format!("invalid facts column: {e}")))?;
        let last_processed_at = self
            .last_processed_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;

        Ok(UserMemoryProfile {
            id,
            user_id: self.user_id,
            facts,
            message_count: self.message_count as u32,
            last_processed_at,
            created_at,
            updated_at,
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

fn serialize_facts(facts: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(facts)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize facts: {e}")))
}

// ---------------------------------------------------------------------------
// MemoryRepository implementation
// ---------------------------------------------------------------------------

impl MemoryRepository for SqliteMemoryRepository {
    async fn get_memory(
        &self,
        user_id: &str,
    ) -> Result<Option<UserMemoryProfile>, RepositoryError> {
        self.fetch_profile(user_id).await
    }

    async fn create_memory(&self, user_id: &str) -> Result<UserMemoryProfile, RepositoryError> {
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

        sqlx::query(
            r#"INSERT INTO user_memory (id, user_id, facts, message_count, last_processed_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.user_id)
        .bind(serialize_facts(&profile.facts)?)
        .bind(profile.message_count as i64)
        .bind(Option::<String>::None)
        .bind(format_datetime(&profile.created_at))
        .bind(format_datetime(&profile.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("memory profile already exists for user '{user_id}'"),
            ),
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(profile)
    }

    async fn update_memory(
        &self,
        user_id: &str,
        patch: &MemoryPatch,
    ) -> Result<UserMemoryProfile, RepositoryError> {
        let facts_json = patch
            .facts
            .as_ref()
            .map(|facts| serialize_facts(facts))
            .transpose()?;

        // COALESCE keeps the stored value for fields the patch leaves unset
        let result = sqlx::query(
            r#"UPDATE user_memory SET
                   facts = COALESCE(?, facts),
                   message_count = COALESCE(?, message_count),
                   last_processed_at = COALESCE(?, last_processed_at),
                   updated_at = ?
               WHERE user_id = ?"#,
        )
        .bind(facts_json)
        .bind(patch.message_count.map(|c| c as i64))
        .bind(patch.last_processed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&Utc::now()))
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.fetch_profile(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}
