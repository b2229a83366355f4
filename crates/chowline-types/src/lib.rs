//! Shared domain types for Chowline.
//!
//! This crate contains the core domain types of the merchant chat engine:
//! roles, directory records, sessions, messages, summaries, push frames,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod role;
