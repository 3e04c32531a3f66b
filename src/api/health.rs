// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness and readiness checks.
//!
//! Readiness depends on the document store and, when a provider JWKS URL is
//! configured, on the signing keys being loadable. Mail and image host
//! integrations are reported but never make the service unready: without
//! them inquiries are stored undelivered and hosted images are left behind.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Unavailable,
    Disabled,
}

impl ComponentStatus {
    fn from_flag(available: bool) -> Self {
        if available {
            Self::Ok
        } else {
            Self::Unavailable
        }
    }

    fn configured(present: bool) -> Self {
        if present {
            Self::Ok
        } else {
            Self::Disabled
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub database: ComponentStatus,
    /// Absent when no identity provider is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<ComponentStatus>,
    pub mail: ComponentStatus,
    pub media: ComponentStatus,
}

impl HealthChecks {
    fn ready(&self) -> bool {
        self.database == ComponentStatus::Ok
            && self.jwks.is_none_or(|jwks| jwks == ComponentStatus::Ok)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

async fn run_checks(state: &AppState) -> HealthChecks {
    let database = match state.db.health_check() {
        Ok(()) => ComponentStatus::Ok,
        Err(e) => {
            tracing::warn!(error = %e, "Document store health check failed");
            ComponentStatus::Unavailable
        }
    };

    let jwks = match state.verifier.provider_jwks() {
        Some(jwks) => Some(ComponentStatus::from_flag(jwks.is_available().await)),
        None => None,
    };

    HealthChecks {
        database,
        jwks,
        mail: ComponentStatus::configured(state.mailer.is_some()),
        media: ComponentStatus::configured(state.media.is_some()),
    }
}

/// Full component report; 503 when the store or provider keys are unavailable.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "A required component is unavailable", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let checks = run_checks(&state).await;
    let ready = checks.ready();

    let response = ReadyResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is running", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve traffic", body = ReadyResponse),
        (status = 503, description = "Not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn liveness_always_ok() {
        let Json(response) = liveness().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn health_ok_without_optional_integrations() {
        let app = TestApp::new();
        let (status, Json(response)) = health(State(app.state.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "ok");
        assert_eq!(response.checks.database, ComponentStatus::Ok);
        assert!(response.checks.jwks.is_none());
        assert_eq!(response.checks.mail, ComponentStatus::Disabled);
        assert_eq!(response.checks.media, ComponentStatus::Disabled);
    }

    #[tokio::test]
    async fn configured_mailer_is_reported() {
        let mut app = TestApp::new();
        let _outbox = app.with_outbox();
        let (_, Json(response)) = readiness(State(app.state.clone())).await;
        assert_eq!(response.checks.mail, ComponentStatus::Ok);
    }

    #[test]
    fn unavailable_jwks_makes_service_unready() {
        let checks = HealthChecks {
            database: ComponentStatus::Ok,
            jwks: Some(ComponentStatus::Unavailable),
            mail: ComponentStatus::Disabled,
            media: ComponentStatus::Disabled,
        };
        assert!(!checks.ready());

        let checks = HealthChecks {
            jwks: None,
            ..checks
        };
        assert!(checks.ready());
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let value = serde_json::to_value(ComponentStatus::Unavailable).unwrap();
        assert_eq!(value, "unavailable");
    }
}
