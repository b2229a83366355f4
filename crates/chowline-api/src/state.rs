//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! ChatService is generic over repository traits; AppState pins it to the
//! SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use chowline_core::chat::service::ChatService;
use chowline_core::realtime::hub::PushHub;
use chowline_infra::config::{load_server_config, resolve_data_dir};
use chowline_infra::sqlite::chat::SqliteChatRepository;
use chowline_infra::sqlite::directory::SqliteDirectoryRepository;
use chowline_infra::sqlite::pool::{DatabasePool, database_url};
use chowline_types::config::ServerConfig;

/// Concrete type alias for the chat service pinned to infra implementations.
pub type ConcreteChatService = ChatService<SqliteChatRepository, SqliteDirectoryRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub hub: PushHub,
    pub config: ServerConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state from the default data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::open(resolve_data_dir()).await
    }

    /// Connect to the database under `data_dir` and wire services.
    pub async fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_server_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir, &config.database_file)).await?;

        let chat_service = ChatService::new(
            SqliteChatRepository::new(db_pool.clone()),
            SqliteDirectoryRepository::new(db_pool.clone()),
            config.clone(),
        );
        let hub = PushHub::new(config.push_channel_capacity);

        tracing::debug!(data_dir = %data_dir.display(), "Application state ready");

        Ok(Self {
            chat_service: Arc::new(chat_service),
            hub,
            config,
            data_dir,
            db_pool,
        })
    }
}
