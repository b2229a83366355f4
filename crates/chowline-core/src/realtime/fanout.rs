//! Post-commit delivery of chat frames.
//!
//! Fan-out is best-effort: the message is already stored when it runs, so a
//! failed push is logged and reported, never returned as an error.

use chowline_types::chat::DeliveryPackage;
use chowline_types::error::{ChatError, PushError};
use chowline_types::event::ChatFrame;
use tracing::{debug, warn};

/// Pushes frames to a user's live connections.
///
/// Implemented by `PushHub`; tests substitute a recording pusher.
pub trait ChatPusher: Send + Sync {
    fn push_to_user(
        &self,
        username: &str,
        frame: ChatFrame,
    ) -> impl std::future::Future<Output = Result<(), PushError>> + Send;
}

/// Which sides of a send received their frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub sender_delivered: bool,
    pub receiver_delivered: bool,
}

/// Push each side its own view of a stored message.
///
/// The sender's frame echoes `client_message_id` so the originating client
/// can reconcile its optimistic copy.
pub async fn fan_out<P: ChatPusher>(
    pusher: &P,
    package: &DeliveryPackage,
    client_message_id: Option<&str>,
) -> FanoutReport {
    let sender_frame = ChatFrame::for_sender(package, client_message_id);
    let sender_delivered = deliver(pusher, &package.sender_username, sender_frame).await;

    let receiver_delivered = match package.receiver_username.as_deref() {
        Some(username) => {
            let frame = ChatFrame::for_receiver(package, None);
            deliver(pusher, username, frame).await
        }
        None => {
            warn!(
                message_id = package.message.id,
                receiver_id = package.message.receiver_id,
                "Receiver username unknown, skipping live push"
            );
            false
        }
    };

    FanoutReport {
        sender_delivered,
        receiver_delivered,
    }
}

/// Tell the sender a send was rejected.
pub async fn push_rejection<P: ChatPusher>(
    pusher: &P,
    username: &str,
    error: &ChatError,
    client_message_id: Option<&str>,
) -> bool {
    let frame = ChatFrame::error(public_message(error), client_message_id);
    deliver(pusher, username, frame).await
}

/// The error text safe to show a client.
pub fn public_message(error: &ChatError) -> String {
    match error {
        ChatError::Repository(_) => "send failed, please try again later".to_string(),
        other => other.to_string(),
    }
}

async fn deliver<P: ChatPusher>(pusher: &P, username: &str, frame: ChatFrame) -> bool {
    match pusher.push_to_user(username, frame).await {
        Ok(()) => true,
        Err(PushError::Offline(_)) => {
            debug!(username, "User offline, frame not pushed");
            false
        }
        Err(e) => {
            warn!(username, error = %e, "Live push failed");
            false
        }
    }
}
