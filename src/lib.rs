// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realty Server - Property Listings API
//!
//! Backend for a real-estate classifieds site: users browse and search
//! rental and sale listings, publish their own, leave reviews and send
//! inquiries to listing owners.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token verification, user directory lookup, authorization policy
//! - `rate_limit` - Per-address fixed-window limiter for `/api`
//! - `storage` - redb document store, repositories and the audit queue
//! - `mail` / `media` - Outbound email and image host integrations

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod media;
pub mod rate_limit;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
