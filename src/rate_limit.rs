// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-address request rate limiting for the `/api` routes.
//!
//! Fixed-window counters: each source address may make `max_requests`
//! requests per window (default 100 per 15 minutes). Counter state sits
//! behind the [`CounterStore`] trait; the in-memory store sweeps expired
//! windows lazily on every call.
//!
//! The client address is the socket peer unless `TRUST_PROXY` is set, in
//! which case the proxy's `X-Forwarded-For` / `X-Real-IP` headers are used.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitSettings;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded (max {limit} requests/{window_secs}s)")]
    Exceeded { limit: u32, window_secs: u64 },
}

/// Storage for per-key request counters.
pub trait CounterStore: Send + Sync {
    /// Count one request for `key` and return the count in the current
    /// window, starting a new window when the previous one has elapsed.
    fn increment(&self, key: &str, now: Instant, window: Duration) -> u32;
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

/// Process-local counter store.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of addresses with a live window.
    pub fn tracked_keys(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, now: Instant, window: Duration) -> u32 {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        counters.retain(|_, c| now.saturating_duration_since(c.window_start) < window);

        let counter = counters.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            window_start: now,
        });
        counter.count = counter.count.saturating_add(1);
        counter.count
    }
}

/// Fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, settings: RateLimitSettings) -> Self {
        Self { store, settings }
    }

    /// Limiter over a fresh in-memory store.
    pub fn in_memory(settings: RateLimitSettings) -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), settings)
    }

    /// Whether forwarded-for headers identify the client.
    pub fn trusts_proxy(&self) -> bool {
        self.settings.trust_proxy
    }

    /// Count a request from `addr` against the current window.
    pub fn check(&self, addr: &str) -> Result<u32, RateLimitError> {
        self.check_at(addr, Instant::now())
    }

    /// As [`check`](Self::check), at an explicit instant.
    pub fn check_at(&self, addr: &str, now: Instant) -> Result<u32, RateLimitError> {
        let count = self.store.increment(addr, now, self.settings.window);
        if count > self.settings.max_requests {
            return Err(RateLimitError::Exceeded {
                limit: self.settings.max_requests,
                window_secs: self.settings.window.as_secs(),
            });
        }
        Ok(count)
    }
}

/// Source address of a request.
///
/// Behind a trusted proxy: first `X-Forwarded-For` entry, then `X-Real-IP`.
/// Otherwise, and as the fallback, the socket peer, else `unknown`.
pub fn source_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(addr) = forwarded_address(headers) {
            return addr;
        }
    }

    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return Some(addr.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn peer_address(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Source address of the current request, as the limiter sees it.
pub struct ClientAddress(pub String);

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = peer_address(&parts.extensions);
        Ok(ClientAddress(source_address(
            &parts.headers,
            peer,
            state.rate_limiter.trusts_proxy(),
        )))
    }
}

/// Middleware rejecting requests over the limit with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer = peer_address(request.extensions());
    let addr = source_address(request.headers(), peer, limiter.trusts_proxy());

    if let Err(e) = limiter.check(&addr) {
        tracing::warn!(source = %addr, error = %e, "Rate limit exceeded");
        return ApiError::too_many_requests("Too many requests, please try again later.")
            .into_response();
    }

    next.run(request).await
}
