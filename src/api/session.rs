// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    api::Envelope,
    auth::{directory, Auth, TokenSource, Verified},
    error::ApiError,
    state::AppState,
    storage::StoredUser,
};

/// A locally-issued token with the user it was issued for.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    /// Expiry (Unix seconds)
    pub expires_at: i64,
    pub user: StoredUser,
}

/// Exchange any accepted bearer token for a locally-issued one.
///
/// A local token can be re-exchanged, but the new token never outlives the
/// one presented, so a session cannot be extended past its first expiry.
#[utoipa::path(
    post,
    path = "/api/auth/token",
    tag = "Session",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token issued", body = SessionToken),
        (status = 401, description = "Not signed in"),
        (status = 503, description = "Local tokens are not configured")
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Auth(user): Auth,
    Verified(presented): Verified,
) -> Result<Json<Envelope<SessionToken>>, ApiError> {
    let issuer = state
        .issuer
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Token issuance is not configured"))?;

    let record = directory::lookup(&state.db, &user.email)
        .map_err(|e| state.store_error("User", e))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let not_after = (presented.source == TokenSource::Local).then_some(presented.expires_at);
    let issued = issuer.issue_until(&user, not_after)?;

    tracing::info!(user_id = %user.user_id, source = ?user.source, "Local token issued");

    Ok(Json(Envelope::ok(SessionToken {
        token: issued.token,
        expires_at: issued.expires_at,
        user: record,
    })))
}
