//! Chat service: session directory, unread tracking, inbox, and history.
//!
//! ChatService coordinates the ChatRepository and the read-only
//! DirectoryRepository. Sending lives in `dispatch.rs` as a second `impl`
//! block on the same type.

use chowline_types::chat::{
    ChatContext, ChatSession, HistoryPage, HistoryQuery, MarkRead, MessageView, NewChatSession,
    Participant, SessionKey, SessionSummary, SessionWrite,
};
use chowline_types::config::ServerConfig;
use chowline_types::directory::{Merchant, Order, OrderSnapshot, Principal, User};
use chowline_types::error::{ChatError, RepositoryError};
use chowline_types::role::{CounterpartRole, Role};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chat::repository::ChatRepository;
use crate::chat::summary::{SummaryBuilder, sort_by_recent};
use crate::chat::viewpoint::Viewpoint;
use crate::repository::directory::DirectoryRepository;

/// What to do with an existing session's context when a new one is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextPolicy {
    /// Follow the most recently discussed order.
    Rebind,
    /// Only bind a context on creation.
    KeepExisting,
}

/// A viewer's read-only resolution of the session an order points at.
#[derive(Debug)]
pub(crate) struct ViewerSession {
    pub viewpoint: Viewpoint,
    pub order: Order,
    pub session: Option<ChatSession>,
}

/// Display title of a session: counterpart name, then the bound order number.
pub fn session_title(counterpart: &User, order: Option<&Order>) -> String {
    match order {
        Some(order) => format!("{} · Order {}", counterpart.display_name(), order.order_no),
        None => counterpart.display_name().to_string(),
    }
}

/// Reject a customer or courier asking about an order they are not on.
pub(crate) fn ensure_on_order(
    viewer: &User,
    role: CounterpartRole,
    order: &Order,
) -> Result<(), ChatError> {
    let on_order = match role {
        CounterpartRole::Customer => order.customer_id,
        CounterpartRole::Courier => order.courier_id,
    };
    if on_order == Some(viewer.id) {
        return Ok(());
    }
    warn!(
        username = %viewer.username,
        order_id = order.id,
        role = %role,
        "Chat requested for an order the user is not on"
    );
    Err(ChatError::Forbidden(format!("not the {} of this order", role.as_str().to_lowercase())))
}

/// Orchestrates chat sessions, messages, and their per-viewer summaries.
///
/// Generic over `ChatRepository` and `DirectoryRepository` to maintain
/// clean architecture (chowline-core never depends on chowline-infra).
pub struct ChatService<C: ChatRepository, D: DirectoryRepository> {
    pub(crate) chat_repo: C,
    pub(crate) directory: D,
    pub(crate) config: ServerConfig,
}

impl<C: ChatRepository, D: DirectoryRepository> ChatService<C, D> {
    /// Create a new chat service with the given repositories.
    pub fn new(chat_repo: C, directory: D, config: ServerConfig) -> Self {
        Self {
            chat_repo,
            directory,
            config,
        }
    }

    // --- Session directory ---

    /// Find the session for a counterpart or create it, following `order`.
    ///
    /// When the session exists and `order` differs from its bound context,
    /// the context and title are overwritten so that one long-lived session
    /// tracks the most recently discussed order.
    pub async fn resolve_or_create(
        &self,
        merchant_id: i64,
        role: CounterpartRole,
        counterpart: &User,
        order: Option<&Order>,
    ) -> Result<ChatSession, ChatError> {
        self.resolve_session(merchant_id, role, counterpart, order, ContextPolicy::Rebind)
            .await
    }

    /// Make sure a session exists for a counterpart without touching the
    /// context of an existing one. Idempotent, safe to call repeatedly.
    pub async fn ensure_session(
        &self,
        merchant_id: i64,
        role: CounterpartRole,
        counterpart: &User,
        order: Option<&Order>,
    ) -> Result<ChatSession, ChatError> {
        self.resolve_session(
            merchant_id,
            role,
            counterpart,
            order,
            ContextPolicy::KeepExisting,
        )
        .await
    }

    /// Read-only session lookup.
    pub async fn find_session(
        &self,
        merchant_id: i64,
        role: CounterpartRole,
        counterpart_id: i64,
    ) -> Result<Option<ChatSession>, ChatError> {
        let key = SessionKey::new(merchant_id, role, counterpart_id);
        Ok(self.chat_repo.find_session(merchant_id, &key).await?)
    }

    async fn resolve_session(
        &self,
        merchant_id: i64,
        role: CounterpartRole,
        counterpart: &User,
        order: Option<&Order>,
        policy: ContextPolicy,
    ) -> Result<ChatSession, ChatError> {
        let write = self
            .plan_session(merchant_id, role, counterpart, order, policy)
            .await?;
        match self.write_session(write).await {
            Err(RepositoryError::Conflict(_)) => {
                // Lost a first-contact race: the winner's row is the session.
                debug!(merchant_id, counterpart_id = counterpart.id, "Session insert conflicted, re-reading");
                let write = self
                    .plan_session(merchant_id, role, counterpart, order, policy)
                    .await?;
                Ok(self.write_session(write).await?)
            }
            result => Ok(result?),
        }
    }

    /// Decide what a session needs for `order` without writing anything.
    pub(crate) async fn plan_session(
        &self,
        merchant_id: i64,
        role: CounterpartRole,
        counterpart: &User,
        order: Option<&Order>,
        policy: ContextPolicy,
    ) -> Result<SessionWrite, ChatError> {
        let key = SessionKey::new(merchant_id, role, counterpart.id);

        let Some(session) = self.chat_repo.find_session(merchant_id, &key).await? else {
            return Ok(SessionWrite::Create(NewChatSession {
                session_key: key,
                merchant_id,
                counterpart_id: counterpart.id,
                counterpart_role: role,
                context: order.map(|o| ChatContext::order(o.id)),
                title: Some(session_title(counterpart, order)),
                created_at: Utc::now(),
            }));
        };

        Ok(match order {
            Some(order)
                if policy == ContextPolicy::Rebind
                    && session.bound_order_id() != Some(order.id) =>
            {
                SessionWrite::Rebind {
                    context: ChatContext::order(order.id),
                    title: session_title(counterpart, Some(order)),
                    session,
                }
            }
            _ => SessionWrite::Keep(session),
        })
    }

    async fn write_session(&self, write: SessionWrite) -> Result<ChatSession, RepositoryError> {
        match write {
            SessionWrite::Create(new_session) => {
                let session = self.chat_repo.insert_session(&new_session).await?;
                info!(session_key = %session.session_key, merchant_id = session.merchant_id, "Chat session created");
                Ok(session)
            }
            SessionWrite::Rebind {
                mut session,
                context,
                title,
            } => {
                self.chat_repo
                    .rebind_context(session.id, &context, &title)
                    .await?;
                debug!(
                    session_key = %session.session_key,
                    order_id = context.reference_id,
                    "Session context rebound"
                );
                session.context = Some(context);
                session.title = Some(title);
                session.updated_at = Utc::now();
                Ok(session)
            }
            SessionWrite::Keep(session) => Ok(session),
        }
    }

    // --- Unread tracking ---

    /// Unread messages in a session addressed to `receiver`.
    pub async fn count_unread(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, ChatError> {
        Ok(self.chat_repo.count_unread(session_id, receiver).await?)
    }

    /// Mark `receiver`'s messages in one session as read. Idempotent.
    pub async fn mark_session_read(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, ChatError> {
        Ok(self.chat_repo.mark_read(session_id, receiver).await?)
    }

    /// Acknowledge everything the caller has received in the session the
    /// request points at. A session that does not exist yet is a no-op.
    pub async fn mark_read(
        &self,
        principal: &Principal,
        request: &MarkRead,
    ) -> Result<u64, ChatError> {
        let resolved = self
            .resolve_viewer_session(principal, &HistoryQuery::from(request))
            .await?;
        let Some(session) = resolved.session else {
            return Ok(0);
        };

        let flipped = self
            .mark_session_read(session.id, &resolved.viewpoint.participant())
            .await?;
        debug!(
            session_key = %session.session_key,
            username = %principal.username,
            flipped,
            "Messages marked read"
        );
        Ok(flipped)
    }

    // --- Inbox ---

    /// The caller's inbox: one summary per session, most recent first.
    ///
    /// Sessions are first reconciled against the caller's orders, so every
    /// counterpart the caller shares an order with appears even before the
    /// first message.
    pub async fn list_sessions(
        &self,
        principal: &Principal,
    ) -> Result<Vec<SessionSummary>, ChatError> {
        let viewer = self.load_principal(principal).await?;

        let (viewpoint, sessions) = match viewer.role {
            Some(Role::Merchant) => {
                let Some(merchant) = self.directory.get_merchant_by_user_id(viewer.id).await?
                else {
                    return Ok(Vec::new());
                };
                self.reconcile_merchant_inbox(&merchant).await?;
                let sessions = self.chat_repo.list_sessions_by_merchant(merchant.id).await?;
                (
                    Viewpoint::Merchant {
                        merchant_id: merchant.id,
                        user_id: viewer.id,
                    },
                    sessions,
                )
            }
            Some(role) => {
                let Some(role) = role.counterpart() else {
                    return Ok(Vec::new());
                };
                self.reconcile_counterpart_inbox(&viewer, role).await?;
                let sessions = self
                    .chat_repo
                    .list_sessions_by_counterpart(viewer.id, role)
                    .await?;
                (
                    Viewpoint::Counterpart {
                        role,
                        user_id: viewer.id,
                    },
                    sessions,
                )
            }
            None => return Ok(Vec::new()),
        };

        let mut builder = SummaryBuilder::new(&self.chat_repo, &self.directory).with_user(&viewer);
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in &sessions {
            if let Some(summary) = builder.build(session, &viewpoint).await? {
                summaries.push(summary);
            }
        }
        sort_by_recent(&mut summaries);
        Ok(summaries)
    }

    /// Ensure a session exists for every customer and courier on the
    /// merchant's orders.
    pub async fn reconcile_merchant_inbox(&self, merchant: &Merchant) -> Result<(), ChatError> {
        let orders = self.directory.list_orders_by_merchant(merchant.id).await?;
        for order in &orders {
            let peers = [
                (order.customer_id, CounterpartRole::Customer),
                (order.courier_id, CounterpartRole::Courier),
            ];
            for (peer_id, role) in peers {
                let Some(peer_id) = peer_id else { continue };
                match self.directory.get_user_by_id(peer_id).await? {
                    Some(peer) => {
                        self.ensure_session(merchant.id, role, &peer, Some(order))
                            .await?;
                    }
                    None => {
                        warn!(order_id = order.id, peer_id, "Order references a missing user");
                    }
                }
            }
        }
        Ok(())
    }

    /// Ensure a session exists with the merchant of every order the
    /// counterpart took part in.
    pub async fn reconcile_counterpart_inbox(
        &self,
        viewer: &User,
        role: CounterpartRole,
    ) -> Result<(), ChatError> {
        let orders = match role {
            CounterpartRole::Customer => self.directory.list_orders_by_customer(viewer.id).await?,
            CounterpartRole::Courier => self.directory.list_orders_by_courier(viewer.id).await?,
        };
        for order in &orders {
            if let Some(merchant_id) = order.merchant_id {
                self.ensure_session(merchant_id, role, viewer, Some(order))
                    .await?;
            }
        }
        Ok(())
    }

    // --- History ---

    /// One page of the session the request points at, oldest message first.
    pub async fn load_history(
        &self,
        principal: &Principal,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, ChatError> {
        let resolved = self.resolve_viewer_session(principal, query).await?;

        let Some(session) = resolved.session else {
            return Ok(HistoryPage {
                session_id: None,
                messages: Vec::new(),
                order: Some(OrderSnapshot::from(&resolved.order)),
                next_before_id: None,
            });
        };

        let limit = self.config.history_page_size(query.size);
        let mut records = self
            .chat_repo
            .list_messages(session.id, query.before_id, limit)
            .await?;
        records.sort_by_key(|m| m.id);

        let next_before_id = if records.len() as u64 >= u64::from(limit) {
            records.first().map(|m| m.id)
        } else {
            None
        };
        let messages = records
            .iter()
            .map(|m| MessageView::new(m, &session.session_key))
            .collect();

        let order = match session.bound_order_id() {
            Some(id) if id != resolved.order.id => self.directory.get_order_by_id(id).await?,
            _ => Some(resolved.order),
        };

        Ok(HistoryPage {
            session_id: Some(session.session_key.to_string()),
            messages,
            order: order.as_ref().map(OrderSnapshot::from),
            next_before_id,
        })
    }

    /// Resolve which session an order-scoped request refers to, without
    /// creating anything.
    pub(crate) async fn resolve_viewer_session(
        &self,
        principal: &Principal,
        query: &HistoryQuery,
    ) -> Result<ViewerSession, ChatError> {
        let order_id = query
            .order_id
            .ok_or_else(|| ChatError::InvalidRequest("order_id is required".to_string()))?;
        let viewer = self.load_principal(principal).await?;
        let role = viewer
            .role
            .ok_or_else(|| ChatError::Forbidden("account has no chat role".to_string()))?;
        let order = self
            .directory
            .get_order_by_id(order_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("order".to_string()))?;

        match role.counterpart() {
            None => {
                let merchant = self.merchant_of(&viewer).await?;
                if order.merchant_id != Some(merchant.id) {
                    warn!(
                        username = %viewer.username,
                        order_id = order.id,
                        "Merchant requested chat for an order it does not own"
                    );
                    return Err(ChatError::Forbidden(
                        "order belongs to another merchant".to_string(),
                    ));
                }
                let (peer_id, peer_role) = match (query.peer_id, query.peer_role.as_deref()) {
                    (Some(id), Some(role)) => (id, role),
                    _ => {
                        return Err(ChatError::InvalidRequest(
                            "peer_id and peer_role are required".to_string(),
                        ));
                    }
                };
                let peer_role: CounterpartRole =
                    peer_role.parse().map_err(ChatError::InvalidRequest)?;
                let session = self.find_session(merchant.id, peer_role, peer_id).await?;
                Ok(ViewerSession {
                    viewpoint: Viewpoint::Merchant {
                        merchant_id: merchant.id,
                        user_id: viewer.id,
                    },
                    order,
                    session,
                })
            }
            Some(role) => {
                let merchant_id = order
                    .merchant_id
                    .ok_or_else(|| ChatError::NotFound("order merchant".to_string()))?;
                ensure_on_order(&viewer, role, &order)?;
                let session = self.find_session(merchant_id, role, viewer.id).await?;
                Ok(ViewerSession {
                    viewpoint: Viewpoint::Counterpart {
                        role,
                        user_id: viewer.id,
                    },
                    order,
                    session,
                })
            }
        }
    }

    // --- Lookups ---

    pub(crate) async fn load_principal(&self, principal: &Principal) -> Result<User, ChatError> {
        let username = principal.username.trim();
        if username.is_empty() {
            return Err(ChatError::InvalidRequest("sign in first".to_string()));
        }
        self.directory
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| ChatError::NotFound("user".to_string()))
    }

    pub(crate) async fn merchant_of(&self, user: &User) -> Result<Merchant, ChatError> {
        self.directory
            .get_merchant_by_user_id(user.id)
            .await?
            .ok_or_else(|| ChatError::NotFound("merchant profile".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{Fixture, principal};

    #[tokio::test]
    async fn resolve_or_create_is_idempotent() {
        let fx = Fixture::new();
        let customer = fx.user(fx.customer_id);
        let order = fx.order(fx.order_id);

        let first = fx
            .service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&order))
            .await
            .unwrap();
        let second = fx
            .service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&order))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fx.chat.session_count(), 1);
        assert_eq!(first.bound_order_id(), Some(order.id));
        assert_eq!(first.title.as_deref(), Some("Carol · Order NO-100"));
    }

    #[tokio::test]
    async fn resolve_or_create_rebinds_to_newer_order() {
        let fx = Fixture::new();
        let customer = fx.user(fx.customer_id);
        let first_order = fx.order(fx.order_id);
        let second_order = fx.order(fx.second_order_id);

        fx.service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&first_order))
            .await
            .unwrap();
        let session = fx
            .service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&second_order))
            .await
            .unwrap();

        assert_eq!(session.bound_order_id(), Some(second_order.id));
        let stored = fx.chat.sessions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].bound_order_id(), Some(second_order.id));
        assert_eq!(stored[0].title.as_deref(), Some("Carol · Order NO-101"));
    }

    #[tokio::test]
    async fn resolve_or_create_without_context_keeps_binding() {
        let fx = Fixture::new();
        let customer = fx.user(fx.customer_id);
        let order = fx.order(fx.order_id);

        fx.service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&order))
            .await
            .unwrap();
        let session = fx
            .service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, None)
            .await
            .unwrap();
        assert_eq!(session.bound_order_id(), Some(order.id));
    }

    #[tokio::test]
    async fn ensure_session_never_rebinds() {
        let fx = Fixture::new();
        let customer = fx.user(fx.customer_id);
        let first_order = fx.order(fx.order_id);
        let second_order = fx.order(fx.second_order_id);

        fx.service
            .ensure_session(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&first_order))
            .await
            .unwrap();
        let writes = fx.chat.session_writes();
        let session = fx
            .service
            .ensure_session(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&second_order))
            .await
            .unwrap();

        assert_eq!(session.bound_order_id(), Some(first_order.id));
        assert_eq!(fx.chat.session_writes(), writes);
    }

    #[tokio::test]
    async fn insert_conflict_resolves_to_existing_session() {
        let fx = Fixture::new();
        let customer = fx.user(fx.customer_id);
        let order = fx.order(fx.order_id);
        fx.chat.simulate_concurrent_insert();

        let session = fx
            .service
            .resolve_or_create(fx.merchant_id, CounterpartRole::Customer, &customer, Some(&order))
            .await
            .unwrap();

        assert_eq!(fx.chat.session_count(), 1);
        assert_eq!(session.id, fx.chat.sessions()[0].id);
        assert_eq!(session.bound_order_id(), Some(order.id));
    }

    #[tokio::test]
    async fn unread_counts_follow_sends_and_mark_read() {
        let fx = Fixture::new();
        for text in ["one", "two", "three"] {
            fx.service
                .send(&principal("mia"), fx.merchant_to_customer(text))
                .await
                .unwrap();
        }

        let session = fx.chat.sessions().remove(0);
        let customer = Participant::new(fx.customer_id, Role::Customer);
        assert_eq!(fx.service.count_unread(session.id, &customer).await.unwrap(), 3);

        let flipped = fx
            .service
            .mark_read(&principal("carol"), &fx.customer_mark_read())
            .await
            .unwrap();
        assert_eq!(flipped, 3);
        assert_eq!(fx.service.count_unread(session.id, &customer).await.unwrap(), 0);

        let again = fx
            .service
            .mark_read(&principal("carol"), &fx.customer_mark_read())
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(fx.service.count_unread(session.id, &customer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_one_session() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("for carol"))
            .await
            .unwrap();
        fx.service
            .send(&principal("mia"), fx.merchant_to_courier("for dan"))
            .await
            .unwrap();

        fx.service
            .mark_read(&principal("carol"), &fx.customer_mark_read())
            .await
            .unwrap();

        let courier_session = fx
            .service
            .find_session(fx.merchant_id, CounterpartRole::Courier, fx.courier_id)
            .await
            .unwrap()
            .unwrap();
        let courier = Participant::new(fx.courier_id, Role::Courier);
        assert_eq!(
            fx.service.count_unread(courier_session.id, &courier).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn mark_read_without_session_is_noop() {
        let fx = Fixture::new();
        let flipped = fx
            .service
            .mark_read(&principal("carol"), &fx.customer_mark_read())
            .await
            .unwrap();
        assert_eq!(flipped, 0);
        assert_eq!(fx.chat.session_count(), 0);
    }

    #[tokio::test]
    async fn merchant_inbox_backfills_from_orders() {
        let fx = Fixture::new();
        let inbox = fx.service.list_sessions(&principal("mia")).await.unwrap();

        // Order 100 has a customer and a courier; order 101 shares the customer.
        assert_eq!(inbox.len(), 2);
        assert_eq!(fx.chat.session_count(), 2);
        let roles: Vec<Role> = inbox.iter().map(|s| s.peer_role).collect();
        assert!(roles.contains(&Role::Customer));
        assert!(roles.contains(&Role::Courier));

        // Listing again creates nothing new.
        fx.service.list_sessions(&principal("mia")).await.unwrap();
        assert_eq!(fx.chat.session_count(), 2);
    }

    #[tokio::test]
    async fn inbox_is_sorted_by_last_message() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_courier("first"))
            .await
            .unwrap();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("second"))
            .await
            .unwrap();

        let inbox = fx.service.list_sessions(&principal("mia")).await.unwrap();
        assert_eq!(inbox[0].peer_role, Role::Customer);
        assert_eq!(inbox[0].last_message.as_deref(), Some("second"));
        assert_eq!(inbox[1].peer_role, Role::Courier);
    }

    #[tokio::test]
    async fn counterpart_inbox_shows_merchant_as_peer() {
        let fx = Fixture::new();
        let inbox = fx.service.list_sessions(&principal("carol")).await.unwrap();

        assert_eq!(inbox.len(), 1);
        let summary = &inbox[0];
        assert_eq!(summary.peer_role, Role::Merchant);
        assert_eq!(summary.peer_id, fx.merchant_user_id);
        assert_eq!(summary.peer_name.as_deref(), Some("Mia's Noodles"));
        assert_eq!(summary.unread_count, 0);
    }

    #[tokio::test]
    async fn inbox_for_roleless_user_is_empty() {
        let fx = Fixture::new();
        let inbox = fx.service.list_sessions(&principal("root")).await.unwrap();
        assert!(inbox.is_empty());
        assert_eq!(fx.chat.session_count(), 0);
    }

    #[tokio::test]
    async fn inbox_for_unknown_user_is_not_found() {
        let fx = Fixture::new();
        let err = fx.service.list_sessions(&principal("ghost")).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn history_pages_are_ascending_and_disjoint() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.service
                .send(&principal("mia"), fx.merchant_to_customer(&format!("m{i}")))
                .await
                .unwrap();
        }

        let newest = fx
            .service
            .load_history(&principal("carol"), &fx.customer_history(None, Some(2)))
            .await
            .unwrap();
        assert_eq!(newest.messages.len(), 2);
        assert!(newest.messages[0].id < newest.messages[1].id);
        assert_eq!(newest.messages[1].content, "m4");

        let cursor = newest.next_before_id.unwrap();
        let older = fx
            .service
            .load_history(&principal("carol"), &fx.customer_history(Some(cursor), Some(2)))
            .await
            .unwrap();
        assert_eq!(older.messages.len(), 2);
        assert!(older.messages[0].id < older.messages[1].id);
        assert!(older.messages.last().unwrap().id < newest.messages.first().unwrap().id);

        let oldest = fx
            .service
            .load_history(
                &principal("carol"),
                &fx.customer_history(older.next_before_id, Some(2)),
            )
            .await
            .unwrap();
        assert_eq!(oldest.messages.len(), 1);
        assert_eq!(oldest.messages[0].content, "m0");
        assert!(oldest.next_before_id.is_none());
    }

    #[tokio::test]
    async fn history_carries_session_key_and_order() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("hello"))
            .await
            .unwrap();

        let page = fx
            .service
            .load_history(&principal("mia"), &fx.merchant_history_of_customer())
            .await
            .unwrap();
        let key = SessionKey::new(fx.merchant_id, CounterpartRole::Customer, fx.customer_id);
        assert_eq!(page.session_id.as_deref(), Some(key.as_str()));
        assert!(page.messages.iter().all(|m| m.session_id == key.as_str()));
        assert_eq!(page.order.unwrap().order_no, "NO-100");
    }

    #[tokio::test]
    async fn history_without_session_is_empty_and_creates_nothing() {
        let fx = Fixture::new();
        let page = fx
            .service
            .load_history(&principal("carol"), &fx.customer_history(None, None))
            .await
            .unwrap();
        assert!(page.session_id.is_none());
        assert!(page.messages.is_empty());
        assert_eq!(page.order.unwrap().order_id, fx.order_id);
        assert_eq!(fx.chat.session_count(), 0);
    }

    #[tokio::test]
    async fn merchant_history_requires_peer() {
        let fx = Fixture::new();
        let query = HistoryQuery {
            order_id: Some(fx.order_id),
            ..Default::default()
        };
        let err = fx
            .service
            .load_history(&principal("mia"), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn merchant_history_of_foreign_order_is_forbidden() {
        let fx = Fixture::new();
        let query = HistoryQuery {
            order_id: Some(fx.foreign_order_id),
            peer_id: Some(fx.customer_id),
            peer_role: Some("customer".to_string()),
            ..Default::default()
        };
        let err = fx
            .service
            .load_history(&principal("mia"), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }

    #[tokio::test]
    async fn counterpart_history_of_unrelated_order_is_forbidden() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("for carol"))
            .await
            .unwrap();

        let query = HistoryQuery {
            order_id: Some(fx.foreign_order_id),
            ..Default::default()
        };
        let err = fx
            .service
            .load_history(&principal("carol"), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        // Eve is a customer, but not of order 100.
        let err = fx
            .service
            .load_history(&principal("eve"), &fx.customer_history(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        // Order 101 has no courier.
        let query = HistoryQuery {
            order_id: Some(fx.second_order_id),
            ..Default::default()
        };
        let err = fx
            .service
            .load_history(&principal("dan"), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }

    #[tokio::test]
    async fn mark_read_of_unrelated_order_is_forbidden() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("for carol"))
            .await
            .unwrap();

        let err = fx
            .service
            .mark_read(&principal("eve"), &fx.customer_mark_read())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
        assert!(fx.chat.messages().iter().all(|m| !m.read));
    }

    #[tokio::test]
    async fn summaries_differ_by_viewpoint() {
        let fx = Fixture::new();
        fx.service
            .send(&principal("mia"), fx.merchant_to_customer("Hello"))
            .await
            .unwrap();

        let merchant_view = fx.service.list_sessions(&principal("mia")).await.unwrap();
        let customer_view = fx.service.list_sessions(&principal("carol")).await.unwrap();

        let m = merchant_view
            .iter()
            .find(|s| s.peer_role == Role::Customer)
            .unwrap();
        let c = &customer_view[0];
        assert_eq!(m.session_id, c.session_id);
        assert_eq!(m.peer_id, fx.customer_id);
        assert_eq!(c.peer_id, fx.merchant_user_id);
        assert_eq!(m.unread_count, 0);
        assert_eq!(c.unread_count, 1);
    }
}
