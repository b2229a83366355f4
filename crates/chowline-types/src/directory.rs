//! Records owned by the surrounding CRUD system.
//!
//! Users, merchants, and orders are read-only from the chat engine's point of
//! view: it looks them up but never writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// A platform account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    /// `None` for accounts that take no part in chat (administrators).
    pub role: Option<Role>,
}

impl User {
    /// Nickname when set and non-blank, otherwise the username.
    pub fn display_name(&self) -> &str {
        match self.nickname.as_deref() {
            Some(nick) if !nick.trim().is_empty() => nick,
            _ => &self.username,
        }
    }
}

/// A merchant profile, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
}

/// An order, the usual context a conversation is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub status: Option<String>,
    pub remark: Option<String>,
    pub merchant_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub courier_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Compact view of an order returned alongside chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: i64,
    pub order_no: String,
    pub status: Option<String>,
    pub remark: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_no: order.order_no.clone(),
            status: order.status.clone(),
            remark: order.remark.clone(),
            created_at: order.created_at,
        }
    }
}

/// The authenticated caller of a chat operation.
///
/// Produced by the transport's authentication step and passed explicitly to
/// every service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}
