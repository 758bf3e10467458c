// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Process-local sliding-window rate limiter. Counters are lost on restart.

use crate::app::AppState;
use crate::error::SearchError;
use crate::services::auth::{AuthContext, SESSION_COOKIE_NAME};
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::env;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window; 0 disables limiting.
    pub max_requests: usize,
    pub window: Duration,
    /// Key unverified callers by `x-forwarded-for` instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window: Duration::from_secs(60),
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_requests),
            window: env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
            trust_forwarded_for: env::var("RATE_LIMIT_TRUST_FORWARDED_FOR")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(defaults.trust_forwarded_for),
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    requests: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record a request for `client`. `Err` carries the wait until the
    /// oldest request in the window expires.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        if self.config.max_requests == 0 {
            return Ok(());
        }
        let mut window = self.requests.entry(client.to_string()).or_default();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            window.pop_front();
        }

        if window.len() >= self.config.max_requests {
            let oldest = window.front().copied().unwrap_or(now);
            return Err(self.config.window.saturating_sub(now.duration_since(oldest)));
        }
        window.push_back(now);
        Ok(())
    }

    /// Drop clients whose windows are empty.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.requests
            .retain(|_, times| times.back().is_some_and(|t| now.duration_since(*t) < window));
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Network identity of the caller: the first forwarded address when trusted,
/// else the peer address of the connection.
pub fn client_address(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .flatten();
    if let Some(ip) = forwarded {
        return format!("ip:{ip}");
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

/// Rate-limit key: the user id when the session token resolves, otherwise
/// `address`. Unverified tokens never create buckets of their own.
pub async fn client_id(session: Option<&str>, address: String, auth: &dyn AuthContext) -> String {
    if let Some(token) = session {
        match auth.user_id(token).await {
            Ok(Some(user_id)) => return format!("user:{user_id}"),
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed while rate limiting: {}", e),
        }
    }
    address
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, SearchError> {
    let limiter = &state.rate_limiter;
    if limiter.config().max_requests == 0 {
        return Ok(next.run(req).await);
    }

    let address = client_address(&req, limiter.config().trust_forwarded_for);
    let session = session_cookie(req.headers());
    let client = client_id(session.as_deref(), address, state.auth.as_ref()).await;
    if let Err(wait) = limiter.check(&client) {
        tracing::warn!("Rate limited {}", client);
        return Err(SearchError::RateLimited {
            retry_after_secs: wait.as_secs().max(1),
        });
    }
    Ok(next.run(req).await)
}
