// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! The bearer token is read from `Authorization: Bearer <token>`, or from the
//! session cookie when no Authorization header is sent.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::claims::VerifiedIdentity;
use super::directory;
use super::roles::{require_role, Role};
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Pull the bearer token out of the request.
///
/// A malformed Authorization header is an error even when a cookie is set.
pub fn bearer_token(parts: &Parts, cookie_name: &str) -> Result<String, AuthError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let value = header.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;
        return Ok(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredential)
}

/// Extractor for a verified token that may not have a directory record yet.
///
/// Used by first sign-in registration.
pub struct Verified(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Verified {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<VerifiedIdentity>().cloned() {
            return Ok(Verified(identity));
        }

        let token = bearer_token(parts, &state.config.auth_cookie_name)?;
        let identity = state.verifier.verify(&token).await?;
        parts.extensions.insert(identity.clone());
        Ok(Verified(identity))
    }
}

/// Like [`Verified`], but `None` when the request carries no credential.
///
/// A credential that is present but fails verification is still rejected.
pub struct OptionalVerified(pub Option<VerifiedIdentity>);

impl FromRequestParts<AppState> for OptionalVerified {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Verified::from_request_parts(parts, state).await {
            Ok(Verified(identity)) => Ok(OptionalVerified(Some(identity))),
            Err(AuthError::MissingCredential) => Ok(OptionalVerified(None)),
            Err(e) => Err(e),
        }
    }
}

/// Extractor for authenticated users.
///
/// Verifies the bearer token, then resolves it against the user directory.
/// A verified token whose email has no directory record is rejected with
/// "User not found in database".
///
/// # Example
///
/// ```rust,ignore
/// async fn create_property(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<Property>, ApiError> {
///     // user.email is the lowercase directory key
///     // user.role comes from the stored record
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let Verified(identity) = Verified::from_request_parts(parts, state).await?;
        let user = directory::resolve(&state.db, &identity)?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        require_role(&user, &[Role::Admin])?;
        Ok(AdminOnly(user))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` if no valid authentication is present, instead of rejecting.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(user)) => Ok(OptionalAuth(Some(user))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}
