//! HTTP request handlers for the REST API and WebSocket channel.

pub mod chat;
pub mod ws;
