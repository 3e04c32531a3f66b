// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, Request},
    middleware,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{AuthenticatedUser, IssuedToken, Role},
    rate_limit::rate_limit_middleware,
    state::AppState,
    storage::{
        Category, ListingType, Pagination, PropertyImage, ReviewSummary, StoredInquiry,
        StoredProperty, StoredReview, StoredUser,
    },
};

pub mod extract;
pub mod health;
pub mod inquiries;
pub mod properties;
pub mod reviews;
pub mod session;
pub mod uploads;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Success envelope shared by every `/api` response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/properties",
            get(properties::list_properties).post(properties::create_property),
        )
        .route(
            "/properties/{id}",
            get(properties::get_property)
                .put(properties::update_property)
                .delete(properties::delete_property),
        )
        .route(
            "/user",
            get(users::get_user)
                .post(users::register_user)
                .put(users::update_user)
                .delete(users::remove_profile_picture),
        )
        .route("/auth/token", post(session::issue_token))
        .route(
            "/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/send-inquiry", post(inquiries::send_inquiry))
        .route(
            "/media",
            post(uploads::upload_media)
                .layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_BYTES)),
        )
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        properties::list_properties,
        properties::create_property,
        properties::get_property,
        properties::update_property,
        properties::delete_property,
        users::get_user,
        users::register_user,
        users::update_user,
        users::remove_profile_picture,
        session::issue_token,
        reviews::list_reviews,
        reviews::create_review,
        inquiries::send_inquiry,
        uploads::upload_media,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            StoredProperty,
            PropertyImage,
            Category,
            ListingType,
            Pagination,
            StoredUser,
            Role,
            AuthenticatedUser,
            IssuedToken,
            StoredReview,
            ReviewSummary,
            StoredInquiry,
            properties::PropertyInput,
            properties::ImageInput,
            properties::DeletedProperty,
            users::RegisterUserRequest,
            users::UpdateUserRequest,
            session::SessionToken,
            reviews::CreateReviewRequest,
            inquiries::InquiryRequest,
            inquiries::InquiryReceipt,
            uploads::UploadForm,
            health::ReadyResponse,
            health::HealthChecks,
            health::ComponentStatus,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Properties", description = "Property listings"),
        (name = "Users", description = "User directory and profiles"),
        (name = "Session", description = "Local token issuance"),
        (name = "Reviews", description = "Property reviews"),
        (name = "Inquiries", description = "Contact requests to listing owners"),
        (name = "Media", description = "Owner-scoped image uploads"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
