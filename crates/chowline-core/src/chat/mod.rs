//! Merchant chat: sessions, messages, and per-viewer summaries.
//!
//! `repository` defines the persistence port the infrastructure layer
//! implements; `service` and `dispatch` hold the business rules on top of it.

pub mod dispatch;
pub mod repository;
pub mod service;
pub mod summary;
pub mod viewpoint;

#[cfg(test)]
pub(crate) mod testing;
