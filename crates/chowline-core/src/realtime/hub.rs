//! Per-user live channels for pushing chat frames.
//!
//! Built on `tokio::sync::broadcast`: every user with at least one open
//! connection owns one channel, and each connection holds its own receiver,
//! so a user signed in on two devices gets every frame on both.

use std::sync::Arc;

use chowline_types::error::PushError;
use chowline_types::event::ChatFrame;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::realtime::fanout::ChatPusher;

/// Registry of live channels keyed by username.
///
/// Cloning the hub shares the registry.
#[derive(Clone)]
pub struct PushHub {
    channels: Arc<DashMap<String, broadcast::Sender<ChatFrame>>>,
    capacity: usize,
}

impl PushHub {
    /// Create a hub whose per-user channels buffer `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Open a receiver for one connection of `username`.
    pub fn subscribe(&self, username: &str) -> broadcast::Receiver<ChatFrame> {
        self.channels
            .entry(username.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver a frame to every open connection of `username`.
    pub fn publish(&self, username: &str, frame: ChatFrame) -> Result<usize, PushError> {
        let Some(sender) = self.channels.get(username).map(|s| s.clone()) else {
            return Err(PushError::Offline(username.to_string()));
        };
        match sender.send(frame) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                self.prune(username);
                Err(PushError::ChannelClosed(username.to_string()))
            }
        }
    }

    /// Drop the channel of `username` once its last connection is gone.
    pub fn prune(&self, username: &str) {
        let removed = self
            .channels
            .remove_if(username, |_, sender| sender.receiver_count() == 0);
        if removed.is_some() {
            debug!(username, "Live channel released");
        }
    }
}

impl ChatPusher for PushHub {
    async fn push_to_user(&self, username: &str, frame: ChatFrame) -> Result<(), PushError> {
        self.publish(username, frame).map(|_| ())
    }
}

impl std::fmt::Debug for PushHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushHub")
            .field("users", &self.channels.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
