//! Request extractors shared by REST and WebSocket handlers.

pub mod auth;
