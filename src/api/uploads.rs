// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Image uploads for listings and profile pictures.
//!
//! The file lands in the owner's folder on the image host, which is the
//! only place cleanup will later delete from. The returned
//! `{url, publicId}` pair goes straight into a listing's `images` or a
//! profile's picture fields.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{extract::QueryParams, Envelope},
    auth::{directory::normalize_email, roles::authorize_owner_or_admin, Auth},
    error::ApiError,
    rate_limit::ClientAddress,
    state::AppState,
    storage::{AuditEvent, AuditEventType, PropertyImage},
};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Email of the owner to upload for (default: caller; others need admin)
    pub owner: Option<String>,
}

/// Multipart body with a single image part.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

struct ImageFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

/// Take the first `file` part; other parts are ignored.
async fn read_image(mut multipart: Multipart) -> Result<ImageFile, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request("file must be an image"));
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("file is empty"));
        }

        return Ok(ImageFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(ApiError::bad_request("file is required"))
}

#[utoipa::path(
    post,
    path = "/api/media",
    params(UploadQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    tag = "Media",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Image stored in the owner's folder", body = PropertyImage),
        (status = 400, description = "Missing, empty or non-image file"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Uploading for another owner without admin"),
        (status = 413, description = "File too large"),
        (status = 502, description = "Image host refused the upload"),
        (status = 503, description = "Image host is not configured")
    )
)]
pub async fn upload_media(
    State(state): State<AppState>,
    ClientAddress(ip): ClientAddress,
    Auth(user): Auth,
    QueryParams(query): QueryParams<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Envelope<PropertyImage>>), ApiError> {
    let owner = query
        .owner
        .map(|o| normalize_email(&o))
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| user.email.clone());
    authorize_owner_or_admin(&user, Some(&owner))?;

    let file = read_image(multipart?).await?;

    let Some(media) = state.media.as_ref() else {
        return Err(ApiError::service_unavailable("Image uploads are not configured"));
    };

    let image = media
        .upload_image(&owner, file.name, &file.content_type, file.bytes)
        .await
        .map_err(|e| {
            tracing::warn!(owner = %owner, error = %e, "Image upload failed");
            ApiError::new(StatusCode::BAD_GATEWAY, "Image upload failed")
        })?;

    state.audit(
        AuditEvent::new(AuditEventType::MediaUploaded)
            .with_actor(&user.user_id, &user.email)
            .with_target(&owner)
            .with_ip(ip)
            .with_details(serde_json::json!({ "publicId": image.public_id })),
    );

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(image).with_message("Image uploaded")),
    ))
}
