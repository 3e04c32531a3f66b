// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::verifier::{LocalTokenIssuer, TokenVerifier};
use crate::config::Config;
use crate::error::ApiError;
use crate::mail::Mailer;
use crate::media::MediaClient;
use crate::rate_limit::RateLimiter;
use crate::storage::{AuditEvent, AuditQueue, Database, StoreError};

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    /// Present when `JWT_SECRET` is configured
    pub issuer: Option<Arc<LocalTokenIssuer>>,
    pub rate_limiter: RateLimiter,
    pub audit: AuditQueue,
    /// Present when SMTP is configured
    pub mailer: Option<Arc<Mailer>>,
    /// Present when the image host is configured
    pub media: Option<Arc<MediaClient>>,
}

impl AppState {
    /// State with no mailer and no image host; token verification and
    /// issuance follow `config`.
    pub fn new(
        db: Arc<Database>,
        config: Config,
        verifier: TokenVerifier,
        audit: AuditQueue,
    ) -> Self {
        let issuer = config
            .local_tokens
            .as_ref()
            .map(|local| Arc::new(LocalTokenIssuer::from_config(local)));
        let rate_limiter = RateLimiter::in_memory(config.rate_limit);

        Self {
            db,
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            issuer,
            rate_limiter,
            audit,
            mailer: None,
            media: None,
        }
    }

    pub fn with_mailer(mut self, mailer: Mailer) -> Self {
        self.mailer = Some(Arc::new(mailer));
        self
    }

    pub fn with_media(mut self, media: MediaClient) -> Self {
        self.media = Some(Arc::new(media));
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Enqueue an audit event (at-most-once).
    pub fn audit(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    /// Translate a store failure for `what` ("Property", "User", ...) into
    /// an API error. The underlying detail is only exposed outside
    /// production.
    pub fn store_error(&self, what: &str, err: StoreError) -> ApiError {
        let api = match &err {
            StoreError::NotFound(_) => ApiError::not_found(format!("{what} not found")),
            StoreError::AlreadyExists(_) => ApiError::conflict(format!("{what} already exists")),
            StoreError::InvalidId(_) => ApiError::bad_request(format!("Invalid {} id", what.to_lowercase())),
            e if e.is_unavailable() => {
                tracing::error!(error = %e, resource = what, "Document store unavailable");
                ApiError::service_unavailable("Storage temporarily unavailable")
            }
            e => {
                tracing::error!(error = %e, resource = what, "Document store operation failed");
                ApiError::internal(format!("Failed to process {}", what.to_lowercase()))
            }
        };

        if self.config.environment.exposes_error_details() {
            api.with_detail(err.to_string())
        } else {
            api
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::config::Environment;
    use crate::storage::StoreError;
    use crate::test_support::TestApp;

    #[test]
    fn store_errors_map_to_statuses() {
        let app = TestApp::new();
        let state = &app.state;

        let nf = state.store_error("Property", StoreError::NotFound("x".into()));
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "Property not found");

        let bad = state.store_error("Property", StoreError::InvalidId("x".into()));
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let dup = state.store_error("User", StoreError::AlreadyExists("x".into()));
        assert_eq!(dup.status, StatusCode::CONFLICT);

        let serde_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let internal = state.store_error("Review", StoreError::Serde(serde_err));
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn detail_hidden_in_production() {
        let app = TestApp::with_environment(Environment::Production);
        let err = app
            .state
            .store_error("Property", StoreError::NotFound("properties abc".into()));
        assert!(err.detail.is_none());

        let app = TestApp::with_environment(Environment::Development);
        let err = app
            .state
            .store_error("Property", StoreError::NotFound("properties abc".into()));
        assert_eq!(err.detail.as_deref(), Some("not found: properties abc"));
    }
}
