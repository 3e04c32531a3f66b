// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication for the listings API.
//!
//! ## Auth Flow
//!
//! 1. The frontend signs the user in with Clerk, or exchanges an existing
//!    session for a locally-issued token at `POST /api/auth/token`
//! 2. Requests carry `Authorization: Bearer <JWT>` (or the session cookie)
//! 3. The server:
//!    - Tries each configured verification strategy in order
//!      (Clerk JWKS, then the local HS256 secret)
//!    - Resolves the verified email against the user directory
//!    - Uses the directory record's role, never a token claim
//!
//! ## Security
//!
//! - Property reads, review reads, inquiries and health are public
//! - JWKS is fetched over HTTPS and cached with a TTL
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod directory;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;
pub mod verifier;

pub use claims::{AuthenticatedUser, TokenSource, VerifiedIdentity};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, OptionalAuth, OptionalVerified, Verified};
pub use jwks::JwksManager;
pub use roles::Role;
pub use verifier::{IssuedToken, LocalTokenIssuer, TokenVerifier};
