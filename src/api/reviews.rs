// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        extract::{JsonBody, QueryParams},
        Envelope,
    },
    auth::directory::normalize_email,
    error::ApiError,
    state::AppState,
    storage::{timestamp, ReviewRepository, ReviewSummary, StoredReview},
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuery {
    /// Property whose reviews to list
    pub property_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub property_id: Option<String>,
    /// Whole number from 1 to 5
    #[schema(value_type = Option<u8>)]
    pub rating: Option<Value>,
    pub comment: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Ratings are whole numbers 1 to 5, given as a number or a numeric string.
fn parse_rating(value: Option<&Value>) -> Result<u8, ApiError> {
    let rating = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match rating {
        Some(r @ 1..=5) => Ok(r as u8),
        _ => Err(ApiError::bad_request("rating must be a whole number from 1 to 5")),
    }
}

#[utoipa::path(
    get,
    path = "/api/reviews",
    params(ReviewQuery),
    tag = "Reviews",
    responses(
        (status = 200, description = "Reviews newest first, with count and average", body = ReviewSummary),
        (status = 400, description = "propertyId missing")
    )
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ReviewQuery>,
) -> Result<Json<Envelope<ReviewSummary>>, ApiError> {
    let property_id = required("propertyId", query.property_id)?;
    let summary = ReviewRepository::new(&state.db)
        .list_for_property(&property_id)
        .map_err(|e| state.store_error("Review", e))?;

    Ok(Json(Envelope::ok(summary)))
}

#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewRequest,
    tag = "Reviews",
    responses(
        (status = 201, description = "Review created", body = StoredReview),
        (status = 400, description = "Missing or invalid field")
    )
)]
pub async fn create_review(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredReview>>), ApiError> {
    let property_id = required("propertyId", request.property_id)?;
    let rating = parse_rating(request.rating.as_ref())?;
    let comment = required("comment", request.comment)?;
    let name = required("name", request.name)?;
    let email = normalize_email(&required("email", request.email)?);

    let review = StoredReview {
        id: uuid::Uuid::new_v4().to_string(),
        property_id,
        rating,
        comment,
        name,
        email,
        created_at: timestamp::now(),
    };
    ReviewRepository::new(&state.db)
        .create(&review)
        .map_err(|e| state.store_error("Review", e))?;

    tracing::info!(review_id = %review.id, property_id = %review.property_id, rating, "Review created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(review).with_message("Review submitted successfully")),
    ))
}
