// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication and authorization error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token in the Authorization header or session cookie
    MissingCredential,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token could not be decoded at all
    MalformedToken,
    /// At least one strategy recognized the token but it has expired
    TokenExpired,
    /// At least one strategy recognized the token but rejected it
    InvalidToken,
    /// No strategy could verify the token
    AuthenticationFailed,
    /// Token verified but its email has no directory record
    UserNotFound,
    /// Identity lacks the role or ownership required
    InsufficientPermissions { required: String },
    /// JWKS fetch failed
    JwksFetchError(String),
    /// No matching key in JWKS
    NoMatchingKey,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    success: bool,
    message: String,
    code: &'static str,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidToken => "invalid_token",
            AuthError::AuthenticationFailed => "authentication_failed",
            AuthError::UserNotFound => "user_not_found",
            AuthError::InsufficientPermissions { .. } => "insufficient_permissions",
            AuthError::JwksFetchError(_) => "jwks_fetch_error",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::AuthenticationFailed
            | AuthError::UserNotFound
            | AuthError::NoMatchingKey => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AuthError::JwksFetchError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "Authentication required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::AuthenticationFailed => write!(f, "Authentication failed"),
            AuthError::UserNotFound => write!(f, "User not found in database"),
            AuthError::InsufficientPermissions { required } => {
                write!(f, "Insufficient permissions: requires {required}")
            }
            AuthError::JwksFetchError(msg) => write!(f, "Failed to fetch JWKS: {msg}"),
            AuthError::NoMatchingKey => write!(f, "No matching key found in JWKS"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            success: false,
            message: self.to_string(),
            code: self.error_code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_credential_returns_401() {
        let response = AuthError::MissingCredential.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "missing_credential");
    }

    #[tokio::test]
    async fn insufficient_permissions_returns_403() {
        let err = AuthError::InsufficientPermissions {
            required: "admin".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient permissions: requires admin");
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unknown_user_message() {
        assert_eq!(AuthError::UserNotFound.to_string(), "User not found in database");
        assert_eq!(AuthError::UserNotFound.status_code(), StatusCode::UNAUTHORIZED);
    }
}
