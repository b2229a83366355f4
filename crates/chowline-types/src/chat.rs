//! Chat session, message, and summary types.
//!
//! A session is the durable thread between one merchant and one counterpart.
//! Messages are append-only facts inside a session. Summaries and message
//! views are the shapes handed to clients; they carry the public session key
//! instead of the internal numeric session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::directory::OrderSnapshot;
use crate::error::ChatError;
use crate::role::{CounterpartRole, Role};

/// Maximum number of characters kept in a session's last-message preview.
pub const PREVIEW_MAX_CHARS: usize = 80;

/// Shorten message content for the session preview.
///
/// Content up to [`PREVIEW_MAX_CHARS`] characters is returned as-is; longer
/// content is cut at that many characters and terminated with `…`.
pub fn preview_of(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &content[..cut]),
        None => content.to_string(),
    }
}

/// What kind of record a session or message context points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextKind {
    Order,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Order => write!(f, "ORDER"),
        }
    }
}

impl FromStr for ContextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ORDER" => Ok(ContextKind::Order),
            other => Err(format!("invalid context kind: '{other}'")),
        }
    }
}

/// The topic a session is currently about, or a message was sent under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContext {
    pub kind: ContextKind,
    pub reference_id: i64,
}

impl ChatContext {
    pub fn order(order_id: i64) -> Self {
        Self {
            kind: ContextKind::Order,
            reference_id: order_id,
        }
    }

    /// The referenced order id, if this context is an order.
    pub fn order_id(&self) -> Option<i64> {
        match self.kind {
            ContextKind::Order => Some(self.reference_id),
        }
    }
}

/// Public, deterministic identity of a session.
///
/// Rendered as `{merchant_id}:{ROLE}:{counterpart_id}`, so the same
/// counterpart talking to two merchants never shares a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(merchant_id: i64, role: CounterpartRole, counterpart_id: i64) -> Self {
        Self(format!("{merchant_id}:{role}:{counterpart_id}"))
    }

    /// Wrap a key read back from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted conversation between a merchant and one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Internal row id. Never exposed to clients.
    pub id: i64,
    pub session_key: SessionKey,
    pub merchant_id: i64,
    pub counterpart_id: i64,
    pub counterpart_role: CounterpartRole,
    pub context: Option<ChatContext>,
    pub title: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// The order currently bound to this session.
    pub fn bound_order_id(&self) -> Option<i64> {
        self.context.as_ref().and_then(ChatContext::order_id)
    }
}

/// Fields for inserting a session. The row id is assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatSession {
    pub session_key: SessionKey,
    pub merchant_id: i64,
    pub counterpart_id: i64,
    pub counterpart_role: CounterpartRole,
    pub context: Option<ChatContext>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One side of a message: a user id and the role it acted in.
///
/// The merchant side is identified by the merchant's owning user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub role: Role,
}

impl Participant {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub context: Option<ChatContext>,
    pub sender: Participant,
    pub receiver: Participant,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending a message. Always starts unread.
///
/// The session is decided by the [`SessionWrite`] committed alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub context: Option<ChatContext>,
    pub sender: Participant,
    pub receiver: Participant,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewChatMessage {
    /// Build a message, rejecting same-role pairs and blank content.
    pub fn new(
        context: Option<ChatContext>,
        sender: Participant,
        receiver: Participant,
        content: String,
    ) -> Result<Self, ChatError> {
        if sender.role == receiver.role {
            return Err(ChatError::InvalidRequest(format!(
                "sender and receiver cannot both be {}",
                sender.role
            )));
        }
        if content.trim().is_empty() {
            return Err(ChatError::InvalidRequest("content is empty".to_string()));
        }
        Ok(Self {
            context,
            sender,
            receiver,
            content,
            created_at: Utc::now(),
        })
    }

    /// Attach the storage-assigned id and the session it was stored in.
    pub fn into_message(self, id: i64, session_id: i64) -> ChatMessage {
        ChatMessage {
            id,
            session_id,
            context: self.context,
            sender: self.sender,
            receiver: self.receiver,
            content: self.content,
            read: false,
            created_at: self.created_at,
        }
    }
}

/// The session-side half of a send, committed in the same transaction as
/// the message itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionWrite {
    /// First contact: insert the session.
    Create(NewChatSession),
    /// Point an existing session at a newer context.
    Rebind {
        session: ChatSession,
        context: ChatContext,
        title: String,
    },
    /// Existing session, left as is.
    Keep(ChatSession),
}

/// A message as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    /// Public session key.
    pub session_id: String,
    pub order_id: Option<i64>,
    pub sender_id: i64,
    pub sender_role: Role,
    pub receiver_id: i64,
    pub receiver_role: Role,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: &ChatMessage, session_key: &SessionKey) -> Self {
        Self {
            id: message.id,
            session_id: session_key.to_string(),
            order_id: message.context.as_ref().and_then(ChatContext::order_id),
            sender_id: message.sender.id,
            sender_role: message.sender.role,
            receiver_id: message.receiver.id,
            receiver_role: message.receiver.role,
            content: message.content.clone(),
            read: message.read,
            created_at: message.created_at,
        }
    }
}

/// A session as seen by one of its two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Public session key.
    pub session_id: String,
    pub order_id: Option<i64>,
    pub peer_id: i64,
    pub peer_role: Role,
    pub peer_name: Option<String>,
    pub peer_avatar: Option<String>,
    pub order_no: Option<String>,
    pub order_status: Option<String>,
    pub order_remark: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u64,
}

/// Everything fan-out needs after a successful send.
///
/// Summaries and the receiver username are best-effort: once the message is
/// committed, failing to build them degrades the package rather than the
/// send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPackage {
    pub message: MessageView,
    pub sender_session: Option<SessionSummary>,
    pub receiver_session: Option<SessionSummary>,
    pub sender_username: String,
    pub receiver_username: Option<String>,
}

/// An outbound send as received from either transport.
///
/// Every field is optional on the wire so that validation can report a
/// precise `InvalidRequest` instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub receiver_id: Option<i64>,
    #[serde(default)]
    pub receiver_role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Client-side correlation id, echoed back in pushed frames.
    #[serde(default)]
    pub client_message_id: Option<String>,
}

/// Parameters for loading one page of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub peer_id: Option<i64>,
    #[serde(default)]
    pub peer_role: Option<String>,
    #[serde(default)]
    pub before_id: Option<i64>,
    #[serde(default)]
    pub size: Option<u32>,
}

/// Parameters for acknowledging a session's messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkRead {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub peer_id: Option<i64>,
    #[serde(default)]
    pub peer_role: Option<String>,
}

impl From<&MarkRead> for HistoryQuery {
    fn from(req: &MarkRead) -> Self {
        Self {
            order_id: req.order_id,
            peer_id: req.peer_id,
            peer_role: req.peer_role.clone(),
            before_id: None,
            size: None,
        }
    }
}

/// One page of a session's history, oldest message first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Public session key, absent when no session exists yet.
    pub session_id: Option<String>,
    pub messages: Vec<MessageView>,
    pub order: Option<OrderSnapshot>,
    /// Cursor for the next (older) page; present only when this page is full.
    pub next_before_id: Option<i64>,
}
