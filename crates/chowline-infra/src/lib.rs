//! Infrastructure layer for Chowline.
//!
//! Contains implementations of the repository traits defined in `chowline-core`
//! (SQLite storage with split reader/writer pools) and the `config.toml` loader.

pub mod config;
pub mod sqlite;
