//! Send pipeline: validate, resolve identities, persist, and summarize.

use chowline_types::chat::{
    ChatContext, ChatMessage, ChatSession, DeliveryPackage, MessageView, NewChatMessage,
    Participant, SendMessage, SessionSummary, preview_of,
};
use chowline_types::directory::{Order, Principal, User};
use chowline_types::error::{ChatError, RepositoryError};
use chowline_types::role::{CounterpartRole, Role};
use tracing::{debug, info, warn};

use crate::chat::repository::ChatRepository;
use crate::chat::service::{ChatService, ContextPolicy, ensure_on_order};
use crate::chat::summary::SummaryBuilder;
use crate::chat::viewpoint::Viewpoint;
use crate::repository::directory::DirectoryRepository;

/// A send that passed shape validation.
struct ValidSend {
    order_id: i64,
    receiver_id: i64,
    receiver_role: Role,
    content: String,
}

fn validate(principal: &Principal, request: &SendMessage) -> Result<ValidSend, ChatError> {
    if principal.username.trim().is_empty() {
        return Err(ChatError::InvalidRequest("sign in first".to_string()));
    }
    let order_id = request
        .order_id
        .ok_or_else(|| ChatError::InvalidRequest("order_id is required".to_string()))?;
    let receiver_id = request
        .receiver_id
        .ok_or_else(|| ChatError::InvalidRequest("receiver_id is required".to_string()))?;
    let receiver_role: Role = request
        .receiver_role
        .as_deref()
        .ok_or_else(|| ChatError::InvalidRequest("receiver_role is required".to_string()))?
        .parse()
        .map_err(ChatError::InvalidRequest)?;
    let content = request.content.as_deref().map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(ChatError::InvalidRequest("content is empty".to_string()));
    }

    Ok(ValidSend {
        order_id,
        receiver_id,
        receiver_role,
        content: content.to_string(),
    })
}

/// Who is talking to whom, once both ends are resolved against the directory.
struct Route {
    merchant_id: i64,
    counterpart_role: CounterpartRole,
    counterpart: User,
    sender: Participant,
    receiver: Participant,
    sender_view: Viewpoint,
    receiver_view: Viewpoint,
    /// Already loaded while routing; `None` when only the id is known.
    receiver_user: Option<User>,
}

impl<C: ChatRepository, D: DirectoryRepository> ChatService<C, D> {
    /// Persist one message and return what fan-out needs to deliver it.
    ///
    /// Nothing is written until validation and ownership checks pass.
    pub async fn send(
        &self,
        principal: &Principal,
        request: SendMessage,
    ) -> Result<DeliveryPackage, ChatError> {
        let valid = validate(principal, &request)?;

        let sender = self.load_principal(principal).await?;
        let sender_role = sender
            .role
            .ok_or_else(|| ChatError::Forbidden("account has no chat role".to_string()))?;
        let order = self
            .directory
            .get_order_by_id(valid.order_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("order".to_string()))?;

        let route = match sender_role.counterpart() {
            None => self.route_from_merchant(&sender, &order, &valid).await?,
            Some(role) => self.route_from_counterpart(&sender, role, &order, &valid).await?,
        };

        let new_message = NewChatMessage::new(
            Some(ChatContext::order(order.id)),
            route.sender,
            route.receiver,
            valid.content,
        )?;
        let preview = preview_of(&new_message.content);
        let (session, message) = self.commit_send(&route, &order, &new_message, &preview).await?;
        info!(
            session_key = %session.session_key,
            message_id = message.id,
            sender_role = %route.sender.role,
            "Chat message stored"
        );

        let (sender_session, receiver_session, receiver_username) = self
            .describe_delivery(&session, &sender, &order, &route)
            .await;

        Ok(DeliveryPackage {
            message: MessageView::new(&message, &session.session_key),
            sender_session,
            receiver_session,
            sender_username: sender.username,
            receiver_username,
        })
    }

    /// Resolve the session and store the message in one repository commit.
    async fn commit_send(
        &self,
        route: &Route,
        order: &Order,
        message: &NewChatMessage,
        preview: &str,
    ) -> Result<(ChatSession, ChatMessage), ChatError> {
        let plan = || {
            self.plan_session(
                route.merchant_id,
                route.counterpart_role,
                &route.counterpart,
                Some(order),
                ContextPolicy::Rebind,
            )
        };

        let write = plan().await?;
        match self.chat_repo.record_send(&write, message, preview).await {
            Err(RepositoryError::Conflict(_)) => {
                // Another send created the session first; rerun against it.
                debug!(merchant_id = route.merchant_id, "Session insert conflicted, retrying send");
                let write = plan().await?;
                Ok(self.chat_repo.record_send(&write, message, preview).await?)
            }
            result => Ok(result?),
        }
    }

    async fn route_from_merchant(
        &self,
        sender: &User,
        order: &Order,
        valid: &ValidSend,
    ) -> Result<Route, ChatError> {
        let merchant = self.merchant_of(sender).await?;
        if order.merchant_id != Some(merchant.id) {
            warn!(
                username = %sender.username,
                order_id = order.id,
                "Merchant tried to chat about an order it does not own"
            );
            return Err(ChatError::Forbidden(
                "order belongs to another merchant".to_string(),
            ));
        }

        let counterpart_role = CounterpartRole::try_from(valid.receiver_role).map_err(|_| {
            ChatError::InvalidRequest("merchants can only message customers or couriers".into())
        })?;
        let receiver = self
            .directory
            .get_user_by_id(valid.receiver_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("receiver".to_string()))?;
        if receiver.role != Some(valid.receiver_role) {
            return Err(ChatError::InvalidRequest(format!(
                "receiver is not a {}",
                valid.receiver_role
            )));
        }

        Ok(Route {
            merchant_id: merchant.id,
            counterpart_role,
            counterpart: receiver.clone(),
            sender: Participant::new(sender.id, Role::Merchant),
            receiver: Participant::new(receiver.id, valid.receiver_role),
            sender_view: Viewpoint::Merchant {
                merchant_id: merchant.id,
                user_id: sender.id,
            },
            receiver_view: Viewpoint::Counterpart {
                role: counterpart_role,
                user_id: receiver.id,
            },
            receiver_user: Some(receiver),
        })
    }

    async fn route_from_counterpart(
        &self,
        sender: &User,
        role: CounterpartRole,
        order: &Order,
        valid: &ValidSend,
    ) -> Result<Route, ChatError> {
        let merchant_id = order
            .merchant_id
            .ok_or_else(|| ChatError::NotFound("order merchant".to_string()))?;
        let merchant = self
            .directory
            .get_merchant_by_id(merchant_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("merchant".to_string()))?;
        ensure_on_order(sender, role, order)?;

        if valid.receiver_role != Role::Merchant {
            return Err(ChatError::InvalidRequest(format!(
                "{role} can only message the merchant"
            )));
        }
        if valid.receiver_id != merchant.user_id {
            return Err(ChatError::InvalidRequest(
                "receiver is not this order's merchant".to_string(),
            ));
        }

        Ok(Route {
            merchant_id: merchant.id,
            counterpart_role: role,
            counterpart: sender.clone(),
            sender: Participant::new(sender.id, role.role()),
            receiver: Participant::new(merchant.user_id, Role::Merchant),
            sender_view: Viewpoint::Counterpart {
                role,
                user_id: sender.id,
            },
            receiver_view: Viewpoint::Merchant {
                merchant_id: merchant.id,
                user_id: merchant.user_id,
            },
            receiver_user: None,
        })
    }

    /// Build both summaries and the receiver's username after commit.
    ///
    /// Failures here are logged and degrade to `None`.
    async fn describe_delivery(
        &self,
        session: &ChatSession,
        sender: &User,
        order: &Order,
        route: &Route,
    ) -> (Option<SessionSummary>, Option<SessionSummary>, Option<String>) {
        let mut builder = SummaryBuilder::new(&self.chat_repo, &self.directory)
            .with_user(sender)
            .with_order(order);
        if let Some(receiver) = &route.receiver_user {
            builder = builder.with_user(receiver);
        }

        let sender_session = match builder.build(session, &route.sender_view).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session_key = %session.session_key, error = %e, "Sender summary unavailable");
                None
            }
        };
        let receiver_session = match builder.build(session, &route.receiver_view).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session_key = %session.session_key, error = %e, "Receiver summary unavailable");
                None
            }
        };
        let receiver_username = match builder.user(route.receiver.id).await {
            Ok(user) => user.map(|u| u.username),
            Err(e) => {
                warn!(receiver_id = route.receiver.id, error = %e, "Receiver username unavailable");
                None
            }
        };

        (sender_session, receiver_session, receiver_username)
    }
}
