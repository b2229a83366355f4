//! Frames pushed to a user's live chat channel.
//!
//! Serialized as internally tagged JSON (`{"type": "message", ...}`) so that
//! WebSocket clients can dispatch on the `type` field.

use serde::{Deserialize, Serialize};

use crate::chat::{DeliveryPackage, MessageView, SessionSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    /// A new message, with the session as the recipient sees it.
    Message {
        message: MessageView,
        session: Option<SessionSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },

    /// A rejected send, addressed to the sender only.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },

    /// Reply to a client keep-alive.
    Pong,
}

impl ChatFrame {
    /// The frame for the sending side of a delivery.
    pub fn for_sender(package: &DeliveryPackage, client_message_id: Option<&str>) -> Self {
        ChatFrame::Message {
            message: package.message.clone(),
            session: package.sender_session.clone(),
            client_message_id: client_message_id.map(str::to_string),
        }
    }

    /// The frame for the receiving side of a delivery.
    pub fn for_receiver(package: &DeliveryPackage, client_message_id: Option<&str>) -> Self {
        ChatFrame::Message {
            message: package.message.clone(),
            session: package.receiver_session.clone(),
            client_message_id: client_message_id.map(str::to_string),
        }
    }

    pub fn error(message: impl Into<String>, client_message_id: Option<&str>) -> Self {
        ChatFrame::Error {
            message: message.into(),
            client_message_id: client_message_id.map(str::to_string),
        }
    }
}
