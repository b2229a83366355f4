//! Business logic and repository trait definitions for Chowline.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `chowline-types` -- never on
//! `chowline-infra` or any database/IO crate.

pub mod chat;
pub mod realtime;
pub mod repository;
