// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims read from an identity-provider (Clerk) JWT.
///
/// Clerk session tokens carry the user's primary email only when the JWT
/// template adds it; tokens without `email` are rejected by the verifier.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderClaims {
    /// Subject (provider user ID)
    pub sub: String,

    /// Primary email address (custom claim)
    #[serde(default)]
    pub email: Option<String>,

    /// Display name (custom claim)
    #[serde(default)]
    pub name: Option<String>,

    /// Expiration timestamp
    pub exp: i64,

    /// Clerk session ID
    #[serde(default)]
    pub sid: Option<String>,
}

/// Claims of a locally-issued HS256 token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalClaims {
    /// Directory user id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Which verification strategy accepted a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    IdentityProvider,
    Local,
}

/// The result of token verification, before the directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: Option<String>,
    /// Provider `sub`, only for identity-provider tokens
    pub provider_subject: Option<String>,
    pub session_id: Option<String>,
    pub source: TokenSource,
    /// Token expiry (Unix seconds)
    pub expires_at: i64,
}

/// Authenticated user: a verified token merged with its directory record.
///
/// This is the primary type used throughout the application to represent
/// the caller of a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Directory user id
    pub user_id: String,

    /// Lowercase email (directory key)
    pub email: String,

    pub name: String,

    /// Role from the directory record
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_subject: Option<String>,

    pub source: TokenSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuthenticatedUser {
    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
