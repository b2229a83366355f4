//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `chowline-core` using sqlx with split read/write pools.
//! Raw queries, private Row structs, reader pool for SELECTs and the single
//! writer connection for everything else.

use chowline_core::chat::repository::ChatRepository;
use chowline_types::chat::{
    ChatContext, ChatMessage, ChatSession, ContextKind, NewChatMessage, NewChatSession,
    Participant, SessionKey, SessionWrite,
};
use chowline_types::error::RepositoryError;
use chowline_types::role::{CounterpartRole, Role};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct ChatSessionRow {
    id: i64,
    session_key: String,
    merchant_id: i64,
    counterpart_id: i64,
    counterpart_role: String,
    context_type: Option<String>,
    context_id: Option<i64>,
    title: Option<String>,
    last_message_preview: Option<String>,
    last_message_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_key: row.try_get("session_key")?,
            merchant_id: row.try_get("merchant_id")?,
            counterpart_id: row.try_get("counterpart_id")?,
            counterpart_role: row.try_get("counterpart_role")?,
            context_type: row.try_get("context_type")?,
            context_id: row.try_get("context_id")?,
            title: row.try_get("title")?,
            last_message_preview: row.try_get("last_message_preview")?,
            last_message_at: row.try_get("last_message_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let counterpart_role: CounterpartRole = self
            .counterpart_role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatSession {
            id: self.id,
            session_key: SessionKey::from_stored(self.session_key),
            merchant_id: self.merchant_id,
            counterpart_id: self.counterpart_id,
            counterpart_role,
            context: parse_context(self.context_type.as_deref(), self.context_id)?,
            title: self.title,
            last_message_preview: self.last_message_preview,
            last_message_at: self
                .last_message_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    id: i64,
    session_id: i64,
    context_type: Option<String>,
    context_id: Option<i64>,
    sender_id: i64,
    sender_role: String,
    receiver_id: i64,
    receiver_role: String,
    content: String,
    is_read: bool,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            context_type: row.try_get("context_type")?,
            context_id: row.try_get("context_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_role: row.try_get("sender_role")?,
            receiver_id: row.try_get("receiver_id")?,
            receiver_role: row.try_get("receiver_role")?,
            content: row.try_get("content")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        Ok(ChatMessage {
            id: self.id,
            session_id: self.session_id,
            context: parse_context(self.context_type.as_deref(), self.context_id)?,
            sender: Participant::new(self.sender_id, parse_role(&self.sender_role)?),
            receiver: Participant::new(self.receiver_id, parse_role(&self.receiver_role)?),
            content: self.content,
            read: self.is_read,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_role(s: &str) -> Result<Role, RepositoryError> {
    s.parse().map_err(|e: String| RepositoryError::Query(e))
}

fn parse_context(
    kind: Option<&str>,
    reference_id: Option<i64>,
) -> Result<Option<ChatContext>, RepositoryError> {
    match (kind, reference_id) {
        (Some(kind), Some(reference_id)) => {
            let kind: ContextKind = kind.parse().map_err(|e: String| RepositoryError::Query(e))?;
            Ok(Some(ChatContext { kind, reference_id }))
        }
        _ => Ok(None),
    }
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn sessions_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatSession>, RepositoryError> {
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let session_row = ChatSessionRow::from_row(row).map_err(query_error)?;
        sessions.push(session_row.into_session()?);
    }
    Ok(sessions)
}

/// Insert `session` unless its key is taken, which is a `Conflict`.
async fn insert_session_row(
    conn: &mut SqliteConnection,
    session: &NewChatSession,
) -> Result<ChatSession, RepositoryError> {
    let created_at = format_datetime(&session.created_at);
    let result = sqlx::query(
        r#"INSERT INTO chat_sessions (session_key, merchant_id, counterpart_id, counterpart_role, context_type, context_id, title, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT (merchant_id, session_key) DO NOTHING"#,
    )
    .bind(session.session_key.as_str())
    .bind(session.merchant_id)
    .bind(session.counterpart_id)
    .bind(session.counterpart_role.as_str())
    .bind(session.context.map(|c| c.kind.to_string()))
    .bind(session.context.map(|c| c.reference_id))
    .bind(&session.title)
    .bind(&created_at)
    .bind(&created_at)
    .execute(&mut *conn)
    .await
    .map_err(query_error)?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "session '{}' already exists",
            session.session_key
        )));
    }

    Ok(ChatSession {
        id: result.last_insert_rowid(),
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
    })
}

async fn rebind_session_row(
    conn: &mut SqliteConnection,
    session_id: i64,
    context: &ChatContext,
    title: &str,
    updated_at: &DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"UPDATE chat_sessions
           SET context_type = ?, context_id = ?, title = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(context.kind.to_string())
    .bind(context.reference_id)
    .bind(title)
    .bind(format_datetime(updated_at))
    .bind(session_id)
    .execute(&mut *conn)
    .await
    .map_err(query_error)?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn find_session(
        &self,
        merchant_id: i64,
        session_key: &SessionKey,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE merchant_id = ? AND session_key = ?")
            .bind(merchant_id)
            .bind(session_key.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn insert_session(
        &self,
        session: &NewChatSession,
    ) -> Result<ChatSession, RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        insert_session_row(&mut conn, session).await
    }

    async fn rebind_context(
        &self,
        session_id: i64,
        context: &ChatContext,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        rebind_session_row(&mut conn, session_id, context, title, &Utc::now()).await
    }

    async fn list_sessions_by_merchant(
        &self,
        merchant_id: i64,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chat_sessions WHERE merchant_id = ? ORDER BY id")
            .bind(merchant_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        sessions_from_rows(&rows)
    }

    async fn list_sessions_by_counterpart(
        &self,
        counterpart_id: i64,
        role: CounterpartRole,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE counterpart_id = ? AND counterpart_role = ? ORDER BY id",
        )
        .bind(counterpart_id)
        .bind(role.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        sessions_from_rows(&rows)
    }

    async fn record_send(
        &self,
        write: &SessionWrite,
        message: &NewChatMessage,
        preview: &str,
    ) -> Result<(ChatSession, ChatMessage), RepositoryError> {
        let created_at = format_datetime(&message.created_at);
        // Any early return drops the transaction, which rolls everything back.
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let mut session = match write {
            SessionWrite::Create(new_session) => insert_session_row(&mut tx, new_session).await?,
            SessionWrite::Rebind {
                session,
                context,
                title,
            } => {
                rebind_session_row(&mut tx, session.id, context, title, &message.created_at)
                    .await?;
                ChatSession {
                    context: Some(*context),
                    title: Some(title.clone()),
                    ..session.clone()
                }
            }
            SessionWrite::Keep(session) => session.clone(),
        };

        let inserted = sqlx::query(
            r#"INSERT INTO chat_messages (session_id, context_type, context_id, sender_id, sender_role, receiver_id, receiver_role, content, is_read, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)"#,
        )
        .bind(session.id)
        .bind(message.context.map(|c| c.kind.to_string()))
        .bind(message.context.map(|c| c.reference_id))
        .bind(message.sender.id)
        .bind(message.sender.role.as_str())
        .bind(message.receiver.id)
        .bind(message.receiver.role.as_str())
        .bind(&message.content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let updated = sqlx::query(
            r#"UPDATE chat_sessions
               SET last_message_preview = ?, last_message_at = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(preview)
        .bind(&created_at)
        .bind(&created_at)
        .bind(session.id)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(query_error)?;

        session.last_message_preview = Some(preview.to_string());
        session.last_message_at = Some(message.created_at);
        session.updated_at = message.created_at;
        let stored = message
            .clone()
            .into_message(inserted.last_insert_rowid(), session.id);
        Ok((session, stored))
    }

    async fn list_messages(
        &self,
        session_id: i64,
        before_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM chat_messages
               WHERE session_id = ? AND (? IS NULL OR id < ?)
               ORDER BY id DESC
               LIMIT ?"#,
        )
        .bind(session_id)
        .bind(before_id)
        .bind(before_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = ChatMessageRow::from_row(row).map_err(query_error)?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn count_unread(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS cnt FROM chat_messages
               WHERE session_id = ? AND receiver_id = ? AND receiver_role = ? AND is_read = 0"#,
        )
        .bind(session_id)
        .bind(receiver.id)
        .bind(receiver.role.as_str())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let count: i64 = row.try_get("cnt").map_err(query_error)?;
        Ok(count.max(0) as u64)
    }

    async fn mark_read(
        &self,
        session_id: i64,
        receiver: &Participant,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chat_messages SET is_read = 1
               WHERE session_id = ? AND receiver_id = ? AND receiver_role = ? AND is_read = 0"#,
        )
        .bind(session_id)
        .bind(receiver.id)
        .bind(receiver.role.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected())
    }
}
