//! Server configuration types for Chowline.
//!
//! `ServerConfig` represents the top-level `config.toml` that controls
//! history paging, live channel sizing, and the database file name.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the chat server.
///
/// Loaded from `~/.chowline/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Page size used by history requests that do not ask for one.
    #[serde(default = "default_history_page_size")]
    pub default_history_page_size: u32,

    /// Upper bound for any requested history page size.
    #[serde(default = "default_max_history_page_size")]
    pub max_history_page_size: u32,

    /// Buffered frames per user live channel before slow readers lag.
    #[serde(default = "default_push_channel_capacity")]
    pub push_channel_capacity: usize,

    /// SQLite file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_history_page_size() -> u32 {
    50
}

fn default_max_history_page_size() -> u32 {
    200
}

fn default_push_channel_capacity() -> usize {
    256
}

fn default_database_file() -> String {
    "chowline.db".to_string()
}

impl ServerConfig {
    /// Resolve a requested page size against the configured default and cap.
    pub fn history_page_size(&self, requested: Option<u32>) -> u32 {
        let max = self.max_history_page_size.max(1);
        requested
            .unwrap_or(self.default_history_page_size)
            .clamp(1, max)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_history_page_size: default_history_page_size(),
            max_history_page_size: default_max_history_page_size(),
            push_channel_capacity: default_push_channel_capacity(),
            database_file: default_database_file(),
        }
    }
}
