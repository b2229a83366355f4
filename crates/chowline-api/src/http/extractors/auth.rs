//! Bearer token authentication extractor.
//!
//! Extracts and verifies API tokens from:
//! - `Authorization: Bearer <token>` header
//! - `token` query parameter (browsers cannot set headers on WebSocket upgrades)
//!
//! Tokens are SHA-256 hashed and compared against the `api_tokens` table. A
//! valid token resolves to the [`Principal`] of the user it was issued to.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chowline_infra::sqlite::pool::DatabasePool;
use chowline_types::directory::Principal;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::http::error::AppError;
use crate::state::AppState;

/// Prefix marking Chowline API tokens.
const TOKEN_PREFIX: &str = "chl_";

/// The authenticated caller. Extracting this validates the token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let token_hash = hash_api_token(&token);

        let row = sqlx::query(
            r#"SELECT t.id, u.username FROM api_tokens t
               JOIN users u ON u.id = t.user_id
               WHERE t.token_hash = ?"#,
        )
        .bind(&token_hash)
        .fetch_optional(&state.db_pool.reader)
        .await
        .map_err(|e| AppError::Internal(format!("Database error: {e}")))?;

        match row {
            Some(row) => {
                // Update last_used_at (best effort, don't fail the request)
                let id: i64 = row.get("id");
                let username: String = row.get("username");
                let now = chrono::Utc::now().to_rfc3339();
                let _ = sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE id = ?")
                    .bind(&now)
                    .bind(id)
                    .execute(&state.db_pool.writer)
                    .await;
                Ok(AuthUser(Principal::new(username)))
            }
            None => Err(AppError::Unauthorized(
                "Invalid token. Provide a valid token via 'Authorization: Bearer <token>'."
                    .to_string(),
            )),
        }
    }
}

/// Extract the token from the Authorization header or the `token` query parameter.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Ok(Query(TokenQuery { token: Some(token) })) = Query::try_from_uri(&parts.uri) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    Err(AppError::Unauthorized(
        "Missing token. Provide via 'Authorization: Bearer <token>' header or 'token' query parameter."
            .to_string(),
    ))
}

/// Compute SHA-256 hash of an API token (lowercase hex).
pub fn hash_api_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

/// Generate a new token for `username` and store its hash.
///
/// Returns the plaintext token; it cannot be recovered later.
pub async fn issue_api_token(pool: &DatabasePool, username: &str) -> anyhow::Result<String> {
    let user: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&pool.reader)
        .await?;
    let Some((user_id,)) = user else {
        anyhow::bail!("user '{username}' not found");
    };

    let mut token_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    let plaintext = format!(
        "{TOKEN_PREFIX}{}",
        token_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    );

    sqlx::query("INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
        .bind(hash_api_token(&plaintext))
        .bind(user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&pool.writer)
        .await?;

    tracing::info!(username, "API token issued");
    Ok(plaintext)
}
