//! In-memory repositories and a seeded directory for chat service tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chowline_types::chat::{
    ChatContext, ChatMessage, ChatSession, HistoryQuery, MarkRead, NewChatMessage, NewChatSession,
    Participant, SendMessage, SessionKey, SessionWrite,
};
use chowline_types::config::ServerConfig;
use chowline_types::directory::{Merchant, Order, Principal, User};
use chowline_types::error::RepositoryError;
use chowline_types::role::{CounterpartRole, Role};
use chrono::{Duration, Utc};

use crate::chat::repository::ChatRepository;
use crate::chat::service::ChatService;
use crate::repository::directory::DirectoryRepository;

pub fn principal(username: &str) -> Principal {
    Principal::new(username)
}

#[derive(Default)]
struct ChatState {
    sessions: Vec<ChatSession>,
    messages: Vec<ChatMessage>,
    next_session_id: i64,
    next_message_id: i64,
    session_writes: usize,
    race_next_insert: bool,
    fail_next_send: bool,
}

/// Chat storage backed by vectors. Clones share state, so a test can keep a
/// handle for inspection after moving one into the service.
#[derive(Clone, Default)]
pub struct InMemoryChatRepository {
    state: Arc<Mutex<ChatState>>,
}

impl InMemoryChatRepository {
    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Inserts plus context rebinds performed so far.
    pub fn session_writes(&self) -> usize {
        self.state.lock().unwrap().session_writes
    }

    /// Make the next insert behave as if another request inserted the same
    /// key first: the row appears, and the caller sees a conflict.
    pub fn simulate_concurrent_insert(&self) {
        self.state.lock().unwrap().race_next_insert = true;
    }

    /// Make the next `record_send` fail as a storage error would.
    pub fn fail_next_send(&self) {
        self.state.lock().unwrap().fail_next_send = true;
    }

    /// Claim the race flag for an insert of `session`. Returns true when the
    /// insert must report a conflict, storing the competing row if needed.
    fn take_race(state: &mut ChatState, session: &NewChatSession) -> bool {
        let exists = state.sessions.iter().any(|s| {
            s.merchant_id == session.merchant_id && s.session_key == session.session_key
        });
        if state.race_next_insert {
            state.race_next_insert = false;
            if !exists {
                Self::store_session(state, session);
            }
            return true;
        }
        exists
    }

    fn store_session(state: &mut ChatState, session: &NewChatSession) -> ChatSession {
        state.next_session_id += 1;
        let stored = ChatSession {
            id: state.next_session_id,
            session_key: session.session_key.clone(),
            merchant_id: session.merchant_id,
            counterpart_id: session.counterpart_id,
            counterpart_role: session.counterpart_role,
            context: session.context,
            title: session.title.clone(),
            last_message_preview: None,
            last_message_at: None,
            created_at: session.created_at,
            updated_at: session.created_at,
        };
        state.sessions.push(stored.clone());
        state.session_writes += 1;
        stored
    }
}

impl ChatRepository for InMemoryChatRepository {
    async fn find_session(
        &self,
        merchant_id: i64,
        session_key: &SessionKey,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .find(|s| s.merchant_id == merchant_id && &s.session_key == session_key)
            .cloned())
    }

    async fn insert_session(
        &self,
        session: &NewChatSession,
    ) -> Result<ChatSession, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if Self::take_race(&mut state, session) {
            return Err(RepositoryError::Conflict(session.session_key.to_string()));
        }
        Ok(Self::store_session(&mut state, session))
    }

    async fn rebind_context(
        &self,
        session_id: i64,
        context: &ChatContext,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(RepositoryError::NotFound)?;
        session.context = Some(*context);
        session.title = Some(title.to_string());
        session.updated_at = Utc::now();
        state.session_writes += 1;
        Ok(())
    }

    async fn list_sessions_by_merchant(
        &self,
        merchant_id: i64,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.merchant_id == merchant_id)
            .cloned()
            .collect())
    }

    async fn list_sessions_by_counterpart(
        &self,
        counterpart_id: i64,
        role: CounterpartRole,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.counterpart_id == counterpart_id && s.counterpart_role == role)
            .cloned()
            .collect())
    }

    async fn record_send(
        &self,
        write: &SessionWrite,
        message: &NewChatMessage,
        preview: &str,
    ) -> Result<(ChatSession, ChatMessage), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_send {
            state.fail_next_send = false;
            return Err(RepositoryError::Query("disk full".to_string()));
        }

        // Every check runs before the first mutation, so a failure writes nothing.
        let session_id = match write {
            SessionWrite::Create(new_session) => {
                if Self::take_race(&mut state, new_session) {
                    return Err(RepositoryError::Conflict(new_session.session_key.to_string()));
                }
                Self::store_session(&mut state, new_session).id
            }
            SessionWrite::Rebind {
                session,
                context,
                title,
            } => {
                let stored = state
                    .sessions
                    .iter_mut()
                    .find(|s| s.id == session.id)
                    .ok_or(RepositoryError::NotFound)?;
                stored.context = Some(*context);
                stored.title = Some(title.clone());
                state.session_writes += 1;
                session.id
            }
            SessionWrite::Keep(session) => {
                if !state.sessions.iter().any(|s| s.id == session.id) {
                    return Err(RepositoryError::NotFound);
                }
                session.id
            }
        };

        state.next_message_id += 1;
        let stored = message.clone().into_message(state.next_message_id, session_id);
        state.messages.push(stored.clone());
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(RepositoryError::NotFound)?;
        session.last_message_preview = Some(preview.to_string());
        session.last_message_at = Some(stored.created_at);
        session.updated_at = stored.created_at;
        Ok((session.clone(), stored))
    }

    async fn list_messages(
        &self,
        session_id: i64,
        before_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut page: Vec<ChatMessage> = state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| before_id.is_none_or(|before| m.id < before))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn count_unread(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && &m.receiver == receiver && !m.read)
            .count() as u64)
    }

    async fn mark_read(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let mut flipped = 0;
        for m in state.messages.iter_mut() {
            if m.session_id == session_id && &m.receiver == receiver && !m.read {
                m.read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

/// A fixed directory of users, merchants, and orders.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    users: HashMap<i64, User>,
    merchants: HashMap<i64, Merchant>,
    orders: HashMap<i64, Order>,
}

impl InMemoryDirectory {
    pub fn with_user(mut self, id: i64, username: &str, nickname: Option<&str>, role: Option<Role>) -> Self {
        self.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                nickname: nickname.map(str::to_string),
                avatar_url: None,
                role,
            },
        );
        self
    }

    pub fn with_merchant(mut self, id: i64, user_id: i64, name: &str) -> Self {
        self.merchants.insert(
            id,
            Merchant {
                id,
                user_id,
                name: Some(name.to_string()),
            },
        );
        self
    }

    pub fn with_order(
        mut self,
        id: i64,
        merchant_id: i64,
        customer_id: i64,
        courier_id: Option<i64>,
        minutes_ago: i64,
    ) -> Self {
        self.orders.insert(
            id,
            Order {
                id,
                order_no: format!("NO-{id}"),
                status: Some("DELIVERING".to_string()),
                remark: None,
                merchant_id: Some(merchant_id),
                customer_id: Some(customer_id),
                courier_id,
                created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
            },
        );
        self
    }

    fn newest_first(&self, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().filter(|o| keep(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

impl DirectoryRepository for InMemoryDirectory {
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(&user_id).cloned())
    }

    async fn get_merchant_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<Merchant>, RepositoryError> {
        Ok(self.merchants.values().find(|m| m.user_id == user_id).cloned())
    }

    async fn get_merchant_by_id(
        &self,
        merchant_id: i64,
    ) -> Result<Option<Merchant>, RepositoryError> {
        Ok(self.merchants.get(&merchant_id).cloned())
    }

    async fn get_owning_user_id(&self, merchant_id: i64) -> Result<Option<i64>, RepositoryError> {
        Ok(self.merchants.get(&merchant_id).map(|m| m.user_id))
    }

    async fn get_order_by_id(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.get(&order_id).cloned())
    }

    async fn list_orders_by_merchant(&self, merchant_id: i64) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.newest_first(|o| o.merchant_id == Some(merchant_id)))
    }

    async fn list_orders_by_customer(&self, user_id: i64) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.newest_first(|o| o.customer_id == Some(user_id)))
    }

    async fn list_orders_by_courier(&self, user_id: i64) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.newest_first(|o| o.courier_id == Some(user_id)))
    }
}

/// A noodle shop run by `mia`, with customer `carol` and courier `dan`.
///
/// Order 100 has both a customer and a courier; order 101 is a newer order
/// from the same customer. Order 200 belongs to another merchant. `root` has
/// no chat role and `nora` is a merchant user without a merchant profile.
pub struct Fixture {
    pub service: ChatService<InMemoryChatRepository, InMemoryDirectory>,
    pub chat: InMemoryChatRepository,
    pub directory: InMemoryDirectory,
    pub merchant_id: i64,
    pub merchant_user_id: i64,
    pub customer_id: i64,
    pub courier_id: i64,
    pub order_id: i64,
    pub second_order_id: i64,
    pub foreign_order_id: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let directory = InMemoryDirectory::default()
            .with_user(1, "mia", Some("Mia's Noodles"), Some(Role::Merchant))
            .with_user(2, "carol", Some("Carol"), Some(Role::Customer))
            .with_user(3, "dan", None, Some(Role::Courier))
            .with_user(4, "otto", None, Some(Role::Merchant))
            .with_user(5, "eve", None, Some(Role::Customer))
            .with_user(6, "root", None, None)
            .with_user(7, "nora", None, Some(Role::Merchant))
            .with_merchant(10, 1, "Mia's Noodles")
            .with_merchant(20, 4, "Otto's Grill")
            .with_order(100, 10, 2, Some(3), 30)
            .with_order(101, 10, 2, None, 5)
            .with_order(200, 20, 5, None, 10);
        let chat = InMemoryChatRepository::default();

        Self {
            service: ChatService::new(chat.clone(), directory.clone(), ServerConfig::default()),
            chat,
            directory,
            merchant_id: 10,
            merchant_user_id: 1,
            customer_id: 2,
            courier_id: 3,
            order_id: 100,
            second_order_id: 101,
            foreign_order_id: 200,
        }
    }

    pub fn user(&self, id: i64) -> User {
        self.directory.users[&id].clone()
    }

    pub fn order(&self, id: i64) -> Order {
        self.directory.orders[&id].clone()
    }

    pub fn merchant_to_customer(&self, content: &str) -> SendMessage {
        SendMessage {
            order_id: Some(self.order_id),
            receiver_id: Some(self.customer_id),
            receiver_role: Some("CUSTOMER".to_string()),
            content: Some(content.to_string()),
            client_message_id: None,
        }
    }

    pub fn merchant_to_courier(&self, content: &str) -> SendMessage {
        SendMessage {
            receiver_id: Some(self.courier_id),
            receiver_role: Some("COURIER".to_string()),
            ..self.merchant_to_customer(content)
        }
    }

    pub fn customer_to_merchant(&self, content: &str) -> SendMessage {
        SendMessage {
            receiver_id: Some(self.merchant_user_id),
            receiver_role: Some("MERCHANT".to_string()),
            ..self.merchant_to_customer(content)
        }
    }

    pub fn customer_history(&self, before_id: Option<i64>, size: Option<u32>) -> HistoryQuery {
        HistoryQuery {
            order_id: Some(self.order_id),
            before_id,
            size,
            ..Default::default()
        }
    }

    pub fn merchant_history_of_customer(&self) -> HistoryQuery {
        HistoryQuery {
            order_id: Some(self.order_id),
            peer_id: Some(self.customer_id),
            peer_role: Some("CUSTOMER".to_string()),
            ..Default::default()
        }
    }

    pub fn customer_mark_read(&self) -> MarkRead {
        MarkRead {
            order_id: Some(self.order_id),
            ..Default::default()
        }
    }
}
