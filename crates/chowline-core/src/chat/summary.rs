//! Per-viewer session summaries.
//!
//! A `SummaryBuilder` lives for one batch of summaries (an inbox listing, or
//! the two views of a single send) and caches directory lookups across it, so
//! a merchant's inbox of fifty sessions resolves its own user once.

use std::collections::HashMap;

use chowline_types::chat::{ChatSession, Participant, SessionSummary};
use chowline_types::directory::{Order, User};
use chowline_types::error::RepositoryError;
use chowline_types::role::Role;

use crate::chat::repository::ChatRepository;
use crate::chat::viewpoint::Viewpoint;
use crate::repository::directory::DirectoryRepository;

pub struct SummaryBuilder<'a, C: ChatRepository, D: DirectoryRepository> {
    chat_repo: &'a C,
    directory: &'a D,
    users: HashMap<i64, Option<User>>,
    orders: HashMap<i64, Option<Order>>,
    owners: HashMap<i64, Option<i64>>,
}

impl<'a, C: ChatRepository, D: DirectoryRepository> SummaryBuilder<'a, C, D> {
    pub fn new(chat_repo: &'a C, directory: &'a D) -> Self {
        Self {
            chat_repo,
            directory,
            users: HashMap::new(),
            orders: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Prime the cache with records the caller already holds.
    pub fn with_user(mut self, user: &User) -> Self {
        self.users.insert(user.id, Some(user.clone()));
        self
    }

    pub fn with_order(mut self, order: &Order) -> Self {
        self.orders.insert(order.id, Some(order.clone()));
        self
    }

    pub async fn user(&mut self, user_id: i64) -> Result<Option<User>, RepositoryError> {
        if let Some(cached) = self.users.get(&user_id) {
            return Ok(cached.clone());
        }
        let user = self.directory.get_user_by_id(user_id).await?;
        self.users.insert(user_id, user.clone());
        Ok(user)
    }

    pub async fn order(&mut self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        if let Some(cached) = self.orders.get(&order_id) {
            return Ok(cached.clone());
        }
        let order = self.directory.get_order_by_id(order_id).await?;
        self.orders.insert(order_id, order.clone());
        Ok(order)
    }

    pub async fn owning_user_id(&mut self, merchant_id: i64) -> Result<Option<i64>, RepositoryError> {
        if let Some(cached) = self.owners.get(&merchant_id) {
            return Ok(*cached);
        }
        let owner = self.directory.get_owning_user_id(merchant_id).await?;
        self.owners.insert(merchant_id, owner);
        Ok(owner)
    }

    /// Render `session` as `viewpoint` sees it.
    ///
    /// Returns `None` when the viewer's peer cannot be resolved (a merchant
    /// whose owning user is gone).
    pub async fn build(
        &mut self,
        session: &ChatSession,
        viewpoint: &Viewpoint,
    ) -> Result<Option<SessionSummary>, RepositoryError> {
        let peer = match viewpoint.stored_peer(session) {
            Some(peer) => Some(peer),
            None => self
                .owning_user_id(session.merchant_id)
                .await?
                .map(|user_id| Participant::new(user_id, Role::Merchant)),
        };
        let Some(peer) = peer else {
            return Ok(None);
        };

        let peer_user = self.user(peer.id).await?;
        let order = match session.bound_order_id() {
            Some(order_id) => self.order(order_id).await?,
            None => None,
        };
        let unread_count = self
            .chat_repo
            .count_unread(session.id, &viewpoint.participant())
            .await?;

        Ok(Some(SessionSummary {
            session_id: session.session_key.to_string(),
            order_id: session.bound_order_id(),
            peer_id: peer.id,
            peer_role: peer.role,
            peer_name: peer_user.as_ref().map(|u| u.display_name().to_string()),
            peer_avatar: peer_user.and_then(|u| u.avatar_url),
            order_no: order.as_ref().map(|o| o.order_no.clone()),
            order_status: order.as_ref().and_then(|o| o.status.clone()),
            order_remark: order.and_then(|o| o.remark),
            last_message: session.last_message_preview.clone(),
            last_message_time: session.last_message_at,
            unread_count,
        }))
    }
}

/// Sort summaries newest conversation first; sessions without messages last.
pub fn sort_by_recent(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
}
