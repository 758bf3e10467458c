// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Caller identity: session cookie to user id, the anonymous visitor cookie,
//! and the admin token check.

use crate::error::{Result, SearchError};
use async_trait::async_trait;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

/// Cookie holding the raw session token issued at sign-in.
pub const SESSION_COOKIE_NAME: &str = "market_session";

/// Cookie identifying an anonymous browser for the local history tier.
pub const VISITOR_COOKIE_NAME: &str = "market_visitor";

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const VISITOR_COOKIE_MAX_AGE_DAYS: i64 = 365;

/// Resolves a session token to the id of the signed-in user.
#[async_trait]
pub trait AuthContext: Send + Sync {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>>;
}

/// Hash a token the way it is stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Looks sessions up in the `user_sessions` table by token hash.
pub struct PgAuthContext {
    pool: PgPool,
}

impl PgAuthContext {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthContext for PgAuthContext {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM user_sessions
             WHERE token_hash = $1 AND expires_at > now()",
        )
        .bind(hash_token(session_token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id,)| user_id))
    }
}

/// Fixed token to user mapping.
#[derive(Default)]
pub struct StaticAuthContext {
    sessions: HashMap<String, String>,
}

impl StaticAuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, token: &str, user_id: &str) -> Self {
        self.sessions
            .insert(hash_token(token), user_id.to_string());
        self
    }
}

#[async_trait]
impl AuthContext for StaticAuthContext {
    async fn user_id(&self, session_token: &str) -> Result<Option<String>> {
        Ok(self.sessions.get(&hash_token(session_token)).cloned())
    }
}

/// Extract the session token from cookies.
pub fn extract_session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// The visitor id from the cookie, issuing a fresh one when absent.
pub fn ensure_visitor_id(cookies: &Cookies) -> String {
    if let Some(existing) = cookies
        .get(VISITOR_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| Uuid::parse_str(v).is_ok())
    {
        return existing;
    }
    let visitor_id = Uuid::now_v7().to_string();
    cookies.add(create_visitor_cookie(&visitor_id));
    visitor_id
}

pub fn create_visitor_cookie(visitor_id: &str) -> Cookie<'static> {
    Cookie::build((VISITOR_COOKIE_NAME, visitor_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(tower_cookies::cookie::SameSite::Lax)
        .max_age(tower_cookies::cookie::time::Duration::days(
            VISITOR_COOKIE_MAX_AGE_DAYS,
        ))
        .build()
}

/// Check the admin header against the configured token. Admin routes are
/// closed when no token is configured.
pub fn verify_admin_token(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        return Err(SearchError::Forbidden);
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SearchError::Unauthorized)?;

    // Compare digests so the comparison length is fixed.
    if hash_token(provided) != hash_token(expected) {
        return Err(SearchError::Forbidden);
    }
    Ok(())
}
