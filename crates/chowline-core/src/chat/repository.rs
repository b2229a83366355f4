//! ChatRepository trait definition.
//!
//! Provides session and message persistence for the chat engine.
//! Follows the same RPITIT pattern as DirectoryRepository.

use chowline_types::chat::{
    ChatContext, ChatMessage, ChatSession, NewChatMessage, NewChatSession, Participant, SessionKey,
    SessionWrite,
};
use chowline_types::error::RepositoryError;
use chowline_types::role::CounterpartRole;

/// Repository trait for chat session and message persistence.
///
/// Implementations live in chowline-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Find a session by its merchant-scoped key.
    fn find_session(
        &self,
        merchant_id: i64,
        session_key: &SessionKey,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Insert a new session.
    ///
    /// Must fail with `RepositoryError::Conflict` when a session with the same
    /// `(merchant_id, session_key)` already exists.
    fn insert_session(
        &self,
        session: &NewChatSession,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// Overwrite a session's current context and title.
    fn rebind_context(
        &self,
        session_id: i64,
        context: &ChatContext,
        title: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All sessions of a merchant.
    fn list_sessions_by_merchant(
        &self,
        merchant_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// All sessions in which a user is the counterpart in the given role.
    fn list_sessions_by_counterpart(
        &self,
        counterpart_id: i64,
        role: CounterpartRole,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// Commit one send: apply `session`, append the message, and set the
    /// session's last-message preview and time, all in one transaction.
    ///
    /// Returns the session as it stands after the send and the stored
    /// message. A `SessionWrite::Create` that loses a race for its key fails
    /// with `RepositoryError::Conflict`. Any failure leaves nothing written.
    fn record_send(
        &self,
        session: &SessionWrite,
        message: &NewChatMessage,
        preview: &str,
    ) -> impl std::future::Future<Output = Result<(ChatSession, ChatMessage), RepositoryError>> + Send;

    /// Messages of a session with `id < before_id` (when given), newest first.
    fn list_messages(
        &self,
        session_id: i64,
        before_id: Option<i64>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Count unread messages in a session addressed to exactly this receiver.
    fn count_unread(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Mark all of a receiver's unread messages in a session as read.
    ///
    /// Returns the number of messages flipped; zero is not an error.
    fn mark_read(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
