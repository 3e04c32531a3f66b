// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Property listing endpoints.
//!
//! Reads are public. Creating requires a signed-in user; updating and
//! deleting require the listing's owner or an admin. The ownership check
//! and the write happen in the same store transaction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        extract::{JsonBody, QueryParams},
        Envelope,
    },
    auth::{Auth, AuthError},
    error::ApiError,
    media::spawn_cleanup,
    rate_limit::ClientAddress,
    state::AppState,
    storage::{
        timestamp, AuditEvent, AuditEventType, Category, ListingType, OwnershipEnforcer,
        PropertyImage, PropertyQuery, PropertyRepository, StoredProperty,
    },
};

/// An image given either as a bare URL or as `{url, publicId}`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ImageInput {
    Url(String),
    Hosted(PropertyImage),
}

impl From<ImageInput> for PropertyImage {
    fn from(input: ImageInput) -> Self {
        match input {
            ImageInput::Url(url) => PropertyImage {
                url,
                public_id: None,
            },
            ImageInput::Hosted(image) => image,
        }
    }
}

/// Body of create and update requests.
///
/// Numeric fields accept numbers or numeric strings. Fields not listed here
/// (`id`, `createdAt`, owner fields) are ignored.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub title: Option<String>,
    pub location: Option<String>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Value>,
    #[schema(value_type = Option<u32>)]
    pub beds: Option<Value>,
    #[schema(value_type = Option<u32>)]
    pub baths: Option<Value>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub images: Option<Vec<ImageInput>>,
    #[schema(value_type = Option<String>)]
    pub size: Option<Value>,
}

/// Validated changes, ready to apply to a stored listing.
#[derive(Debug, Default)]
struct PropertyPatch {
    title: Option<String>,
    location: Option<String>,
    price: Option<String>,
    beds: Option<u32>,
    baths: Option<u32>,
    description: Option<String>,
    category: Option<Category>,
    listing_type: Option<ListingType>,
    images: Option<Vec<PropertyImage>>,
    size: Option<Option<String>>,
}

impl PropertyPatch {
    fn from_input(input: PropertyInput) -> Result<Self, ApiError> {
        let title = input.title.map(|t| required("title", &t)).transpose()?;
        let location = input.location.map(|l| required("location", &l)).transpose()?;
        let price = match input.price {
            Some(raw) => Some(display_text(&raw).ok_or_else(|| ApiError::bad_request("price is required"))?),
            None => None,
        };
        let category = input
            .category
            .map(|c| c.parse::<Category>().map_err(ApiError::bad_request))
            .transpose()?;
        let listing_type = input
            .listing_type
            .map(|t| t.parse::<ListingType>().map_err(ApiError::bad_request))
            .transpose()?;

        Ok(Self {
            title,
            location,
            price,
            beds: input.beds.as_ref().map(coerce_count),
            baths: input.baths.as_ref().map(coerce_count),
            description: input.description,
            category,
            listing_type,
            images: input
                .images
                .map(|images| images.into_iter().map(PropertyImage::from).collect()),
            size: input.size.as_ref().map(display_text),
        })
    }

    fn apply(self, property: &mut StoredProperty) {
        if let Some(title) = self.title {
            property.title = title;
        }
        if let Some(location) = self.location {
            property.location = location;
        }
        if let Some(price) = self.price {
            property.price = price;
        }
        if let Some(beds) = self.beds {
            property.beds = beds;
        }
        if let Some(baths) = self.baths {
            property.baths = baths;
        }
        if let Some(description) = self.description {
            property.description = description;
        }
        if let Some(category) = self.category {
            property.category = category;
        }
        if let Some(listing_type) = self.listing_type {
            property.listing_type = listing_type;
        }
        if let Some(images) = self.images {
            property.images = images;
        }
        if let Some(size) = self.size {
            property.size = size;
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Non-blank string or number, as display text.
fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Bed/bath counts: numbers or numeric strings, truncated; anything else is 0.
fn coerce_count(value: &Value) -> u32 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n >= 0.0 => n.trunc().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Query parameters for listing properties.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListPropertiesQuery {
    /// `rent` or `sale`
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub category: Option<String>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    /// Page number (default 1)
    pub page: Option<String>,
    /// Page size (default 12, at most 100)
    pub limit: Option<String>,
}

impl ListPropertiesQuery {
    fn into_query(self) -> Result<PropertyQuery, ApiError> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(PropertyQuery {
            listing_type: non_blank(self.listing_type)
                .map(|t| t.parse::<ListingType>().map_err(ApiError::bad_request))
                .transpose()?,
            category: non_blank(self.category)
                .map(|c| c.parse::<Category>().map_err(ApiError::bad_request))
                .transpose()?,
            location: non_blank(self.location),
            page: self.page.and_then(|p| p.trim().parse().ok()),
            limit: self.limit.and_then(|l| l.trim().parse().ok()),
        })
    }
}

/// Response for a deleted listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedProperty {
    pub id: String,
    pub title: String,
}

#[utoipa::path(
    get,
    path = "/api/properties",
    params(ListPropertiesQuery),
    tag = "Properties",
    responses(
        (status = 200, description = "One page of listings, newest first", body = [StoredProperty]),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_properties(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListPropertiesQuery>,
) -> Result<Json<Envelope<Vec<StoredProperty>>>, ApiError> {
    let query = params.into_query()?;
    let page = PropertyRepository::new(&state.db)
        .list(&query)
        .map_err(|e| state.store_error("Property", e))?;

    Ok(Json(Envelope::ok(page.items).with_pagination(page.pagination)))
}

#[utoipa::path(
    get,
    path = "/api/properties/{id}",
    params(("id" = String, Path, description = "Listing id (UUID)")),
    tag = "Properties",
    responses(
        (status = 200, body = StoredProperty),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn get_property(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<StoredProperty>>, ApiError> {
    let property = PropertyRepository::new(&state.db)
        .get(&id)
        .map_err(|e| state.store_error("Property", e))?
        .ok_or_else(|| ApiError::not_found("Property not found"))?;

    Ok(Json(Envelope::ok(property)))
}

#[utoipa::path(
    post,
    path = "/api/properties",
    request_body = PropertyInput,
    tag = "Properties",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Listing created", body = StoredProperty),
        (status = 400, description = "Missing or invalid field"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_property(
    State(state): State<AppState>,
    Auth(user): Auth,
    JsonBody(input): JsonBody<PropertyInput>,
) -> Result<(StatusCode, Json<Envelope<StoredProperty>>), ApiError> {
    for (field, present) in [
        ("title", input.title.is_some()),
        ("location", input.location.is_some()),
        ("price", input.price.is_some()),
    ] {
        if !present {
            return Err(ApiError::bad_request(format!("{field} is required")));
        }
    }

    let patch = PropertyPatch::from_input(input)?;
    let now = timestamp::now();
    let mut property = StoredProperty {
        id: uuid::Uuid::new_v4().to_string(),
        title: String::new(),
        location: String::new(),
        price: String::new(),
        beds: 0,
        baths: 0,
        description: String::new(),
        category: Category::default(),
        listing_type: ListingType::default(),
        images: Vec::new(),
        size: None,
        owner_name: Some(user.name.clone()),
        owner_email: Some(user.email.clone()),
        created_at: now,
        updated_at: now,
    };
    patch.apply(&mut property);

    PropertyRepository::new(&state.db)
        .create(&property)
        .map_err(|e| state.store_error("Property", e))?;

    tracing::info!(property_id = %property.id, owner = %user.email, "Property created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(property).with_message("Property created successfully")),
    ))
}

#[utoipa::path(
    put,
    path = "/api/properties/{id}",
    params(("id" = String, Path, description = "Listing id (UUID)")),
    request_body = PropertyInput,
    tag = "Properties",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated listing", body = StoredProperty),
        (status = 400, description = "Malformed id or invalid field"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not the owner or an admin"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn update_property(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Auth(user): Auth,
    JsonBody(input): JsonBody<PropertyInput>,
) -> Result<Json<Envelope<StoredProperty>>, ApiError> {
    let patch = PropertyPatch::from_input(input)?;

    let updated = PropertyRepository::new(&state.db)
        .try_update(&id, |property| {
            property.verify_access(&user)?;
            patch.apply(property);
            property.updated_at = timestamp::now();
            Ok::<_, AuthError>(property.clone())
        })
        .map_err(|e| state.store_error("Property", e))?
        .map_err(|e| {
            tracing::warn!(property_id = %id, user = %user.email, "Property update denied");
            ApiError::from(e)
        })?;

    Ok(Json(
        Envelope::ok(updated).with_message("Property updated successfully"),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/properties/{id}",
    params(("id" = String, Path, description = "Listing id (UUID)")),
    tag = "Properties",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Listing deleted", body = DeletedProperty),
        (status = 400, description = "Malformed id"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not the owner or an admin"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn delete_property(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ClientAddress(ip): ClientAddress,
    Auth(user): Auth,
) -> Result<Json<Envelope<DeletedProperty>>, ApiError> {
    let removed = PropertyRepository::new(&state.db)
        .try_delete(&id, |property| property.verify_access(&user))
        .map_err(|e| state.store_error("Property", e))?
        .map_err(|e| {
            tracing::warn!(property_id = %id, user = %user.email, "Property delete denied");
            ApiError::from(e)
        })?;

    spawn_cleanup(
        state.media.clone(),
        removed.owner_email.as_deref(),
        removed.image_refs(),
    );

    state.audit(
        AuditEvent::new(AuditEventType::PropertyDeleted)
            .with_actor(&user.user_id, &user.email)
            .with_target(&removed.id)
            .with_ip(ip)
            .with_details(serde_json::json!({
                "title": removed.title,
                "ownerEmail": removed.owner_email,
            })),
    );

    Ok(Json(
        Envelope::ok(DeletedProperty {
            id: removed.id,
            title: removed.title,
        })
        .with_message("Property deleted successfully"),
    ))
}
