//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository traits, but AppState pins them to the
//! concrete SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;

use mnemo_core::chat::service::ChatService;
use mnemo_core::llm::box_provider::BoxLlmProvider;
use mnemo_core::memory::service::MemoryService;
use mnemo_infra::llm::groq::GroqProvider;
use mnemo_infra::llm::groq::config::DEFAULT_MODEL;
use mnemo_infra::sqlite::chat::SqliteChatRepository;
use mnemo_infra::sqlite::memory::SqliteMemoryRepository;
use mnemo_infra::sqlite::pool::DatabasePool;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteChatService = ChatService<SqliteChatRepository>;

pub type ConcreteMemoryService = MemoryService<SqliteMemoryRepository, SqliteChatRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub memory_service: Arc<ConcreteMemoryService>,
    pub provider: Arc<BoxLlmProvider>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to DB, wire services.
    ///
    /// Requires `GROQ_API_KEY` in the environment -- the memory pipeline
    /// and chat replies are unusable without a completion backend, so a
    /// missing key fails startup rather than individual requests.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        // Initialize database
        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("mnemo.db").display());
        let db_pool = DatabasePool::new(&db_url).await?;

        // Completion provider
        let api_key: SecretString = std::env::var("GROQ_API_KEY")
            .context("GROQ_API_KEY is not set")?
            .into();
        let model =
            std::env::var("MNEMO_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let provider = Arc::new(BoxLlmProvider::new(GroqProvider::groq(api_key, &model)));

        // Wire services with their repositories
        let chat_service = ChatService::new(SqliteChatRepository::new(db_pool.clone()));
        let memory_service = MemoryService::new(
            SqliteMemoryRepository::new(db_pool.clone()),
            SqliteChatRepository::new(db_pool.clone()),
        );

        Ok(Self {
            chat_service: Arc::new(chat_service),
            memory_service: Arc::new(memory_service),
            provider,
            data_dir,
            db_pool,
        })
    }
}

/// Resolve the data directory from `MNEMO_DATA_DIR`, falling back to
/// `~/.mnemo`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MNEMO_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".mnemo")
}
