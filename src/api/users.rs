// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory endpoints.
//!
//! - `GET /api/user` returns the caller's record, another record
//!   (`?email=`, owner or admin) or every record (`?all=true`, admin)
//! - `POST /api/user` registers on first sign-in
//! - `PUT /api/user` edits a profile; role changes are admin-only
//! - `DELETE /api/user` removes a profile picture

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        extract::{JsonBody, QueryParams},
        Envelope,
    },
    auth::{
        directory::normalize_email,
        roles::{authorize_owner_or_admin, require_role},
        Auth, AuthError, AuthenticatedUser, OptionalVerified, Role,
    },
    error::ApiError,
    media::spawn_cleanup,
    rate_limit::ClientAddress,
    state::AppState,
    storage::{
        timestamp, AuditEvent, AuditEventType, OwnershipEnforcer, StoreError, StoredUser,
        UserRepository,
    },
};

/// Shortest and longest accepted phone numbers, in digits.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=15;

/// Rewrite a phone number to local format.
///
/// Separators are dropped. A `+<cc>`, `00<cc>` or bare `<cc>` prefix for the
/// configured calling code becomes the `0` trunk prefix; other international
/// numbers keep their `+`.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    let mut international = trimmed.starts_with('+');
    let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if !international {
        if let Some(rest) = digits.strip_prefix("00") {
            digits = rest.to_string();
            international = true;
        }
    }

    let national = match digits.strip_prefix(country_code) {
        Some(rest) if !country_code.is_empty() && (international || !digits.starts_with('0')) => {
            Some(format!("0{}", rest.trim_start_matches('0')))
        }
        _ => None,
    };

    let normalized = match national {
        Some(local) => local,
        None if international => format!("+{digits}"),
        None => digits,
    };

    let count = normalized.chars().filter(char::is_ascii_digit).count();
    if !PHONE_DIGITS.contains(&count) {
        return Err(ApiError::bad_request("Invalid phone number"));
    }
    Ok(normalized)
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace),
        None => false,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Either one record or the full directory.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UserPayload {
    One(StoredUser),
    Many(Vec<StoredUser>),
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserQuery {
    /// Email of the record to read (owner or admin)
    pub email: Option<String>,
    /// `true` to list every user (admin only)
    pub all: Option<String>,
}

fn load_user(state: &AppState, email: &str) -> Result<StoredUser, ApiError> {
    UserRepository::new(&state.db)
        .get(email)
        .map_err(|e| state.store_error("User", e))?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Target of a request: the given email, else the caller.
fn target_email(user: &AuthenticatedUser, requested: Option<String>) -> Result<String, ApiError> {
    let target = non_blank(requested)
        .map(|e| normalize_email(&e))
        .unwrap_or_else(|| user.email.clone());
    authorize_owner_or_admin(user, Some(&target)).map_err(|e| {
        tracing::warn!(actor = %user.email, target = %target, "User record access denied");
        ApiError::from(e)
    })?;
    Ok(target)
}

#[utoipa::path(
    get,
    path = "/api/user",
    params(UserQuery),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "One record, or every record with `all=true`", body = StoredUser),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not the owner or an admin"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    ClientAddress(ip): ClientAddress,
    Auth(user): Auth,
    QueryParams(query): QueryParams<UserQuery>,
) -> Result<Json<Envelope<UserPayload>>, ApiError> {
    if query.all.as_deref().map(str::trim) == Some("true") {
        require_role(&user, &[Role::Admin])?;
        let users = UserRepository::new(&state.db)
            .list_all()
            .map_err(|e| state.store_error("User", e))?;

        state.audit(
            AuditEvent::new(AuditEventType::UsersListed)
                .with_actor(&user.user_id, &user.email)
                .with_ip(ip)
                .with_details(serde_json::json!({ "count": users.len() })),
        );
        return Ok(Json(Envelope::ok(UserPayload::Many(users))));
    }

    let target = target_email(&user, query.email)?;
    let record = load_user(&state, &target)?;
    Ok(Json(Envelope::ok(UserPayload::One(record))))
}

/// Body of a first sign-in registration.
///
/// `email` is only read when the request carries no bearer token. Any
/// `role` field is ignored.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_picture_ref: Option<String>,
}

/// Response for a registration of an email that already has a record.
///
/// Only a verified token for that email gets the record back; an
/// unauthenticated caller learns nothing beyond the conflict.
fn already_registered(
    existing: StoredUser,
    verified: bool,
) -> Result<(StatusCode, Json<Envelope<StoredUser>>), ApiError> {
    if !verified {
        return Err(ApiError::conflict("User already exists"));
    }
    Ok((StatusCode::OK, Json(Envelope::ok(existing).with_message("User already exists"))))
}

#[utoipa::path(
    post,
    path = "/api/user",
    request_body = RegisterUserRequest,
    tag = "Users",
    responses(
        (status = 201, description = "User registered", body = StoredUser),
        (status = 200, description = "Caller's record, already registered", body = StoredUser),
        (status = 400, description = "Missing or invalid field"),
        (status = 409, description = "Email already registered (no bearer token sent)"),
        (status = 401, description = "A bearer token was sent but could not be verified")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    OptionalVerified(identity): OptionalVerified,
    JsonBody(request): JsonBody<RegisterUserRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredUser>>), ApiError> {
    let email = match &identity {
        Some(identity) => identity.email.clone(),
        None => non_blank(request.email)
            .map(|e| normalize_email(&e))
            .ok_or_else(|| ApiError::bad_request("email is required"))?,
    };
    if !valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let repo = UserRepository::new(&state.db);
    if let Some(existing) = repo.get(&email).map_err(|e| state.store_error("User", e))? {
        return already_registered(existing, identity.is_some());
    }

    let name = non_blank(request.name)
        .or_else(|| identity.as_ref().and_then(|i| non_blank(i.name.clone())))
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let phone = non_blank(request.phone)
        .map(|p| normalize_phone(&p, &state.config.phone_country_code))
        .transpose()?;

    let mut record = StoredUser::new(email, name);
    record.phone = phone;
    record.profile_picture = non_blank(request.profile_picture);
    record.profile_picture_ref = non_blank(request.profile_picture_ref);
    let verified = identity.is_some();
    record.provider_subject = identity.and_then(|i| i.provider_subject);

    match repo.create(&record) {
        Ok(()) => {
            tracing::info!(user_id = %record.id, email = %record.email, "User registered");
            Ok((
                StatusCode::CREATED,
                Json(Envelope::ok(record).with_message("User created successfully")),
            ))
        }
        // Lost a race with a concurrent registration of the same email.
        Err(StoreError::AlreadyExists(_)) => {
            let existing = load_user(&state, &record.email)?;
            already_registered(existing, verified)
        }
        Err(e) => Err(state.store_error("User", e)),
    }
}

/// Body of a profile update. `email` selects the target (default: caller).
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    /// Empty string clears the phone number
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_picture_ref: Option<String>,
    /// `admin` or `user`; admin only
    pub role: Option<String>,
}

/// What an update actually changed, for auditing.
#[derive(Debug, Default)]
struct ProfileChanges {
    fields: Vec<&'static str>,
    role: Option<(Role, Role)>,
    picture_changed: bool,
    replaced_ref: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/user",
    request_body = UpdateUserRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated record", body = StoredUser),
        (status = 400, description = "Invalid field"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not the owner or an admin, or a non-admin role change"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    ClientAddress(ip): ClientAddress,
    Auth(user): Auth,
    JsonBody(request): JsonBody<UpdateUserRequest>,
) -> Result<Json<Envelope<StoredUser>>, ApiError> {
    let target = target_email(&user, request.email)?;

    let name = match request.name {
        Some(name) if name.trim().is_empty() => return Err(ApiError::bad_request("name cannot be empty")),
        other => other.map(|n| n.trim().to_string()),
    };
    let phone = match request.phone {
        Some(raw) if raw.trim().is_empty() => Some(None),
        Some(raw) => Some(Some(normalize_phone(&raw, &state.config.phone_country_code)?)),
        None => None,
    };
    let role = request
        .role
        .map(|r| Role::parse(&r).ok_or_else(|| ApiError::bad_request(format!("Invalid role '{r}'"))))
        .transpose()?;
    let picture = non_blank(request.profile_picture);
    let picture_ref = non_blank(request.profile_picture_ref);

    let (record, changes) = UserRepository::new(&state.db)
        .try_update(&target, |record| {
            record.verify_access(&user)?;
            let mut changes = ProfileChanges::default();

            if let Some(role) = role.filter(|r| *r != record.role) {
                require_role(&user, &[Role::Admin])?;
                changes.role = Some((record.role, role));
                record.role = role;
            }
            if let Some(name) = name {
                changes.fields.push("name");
                record.name = name;
            }
            if let Some(phone) = phone {
                changes.fields.push("phone");
                record.phone = phone;
            }
            if let Some(url) = picture {
                changes.picture_changed = true;
                if record.profile_picture_ref != picture_ref {
                    changes.replaced_ref = record.profile_picture_ref.take();
                }
                record.profile_picture = Some(url);
                record.profile_picture_ref = picture_ref;
            }

            record.updated_at = timestamp::now();
            record.updated_by = Some(user.email.clone());
            Ok::<_, ApiError>((record.clone(), changes))
        })
        .map_err(|e| state.store_error("User", e))??;

    if let Some((from, to)) = changes.role {
        tracing::info!(actor = %user.email, target = %target, %from, %to, "Role changed");
        state.audit(
            AuditEvent::new(AuditEventType::RoleChanged)
                .with_actor(&user.user_id, &user.email)
                .with_target(&target)
                .with_ip(ip.clone())
                .with_details(serde_json::json!({ "from": from, "to": to })),
        );
    }
    if !changes.fields.is_empty() {
        state.audit(
            AuditEvent::new(AuditEventType::ProfileUpdated)
                .with_actor(&user.user_id, &user.email)
                .with_target(&target)
                .with_ip(ip.clone())
                .with_details(serde_json::json!({ "fields": changes.fields })),
        );
    }
    if changes.picture_changed {
        state.audit(
            AuditEvent::new(AuditEventType::ProfilePictureChanged)
                .with_actor(&user.user_id, &user.email)
                .with_target(&target)
                .with_ip(ip),
        );
        spawn_cleanup(
            state.media.clone(),
            Some(target.as_str()),
            changes.replaced_ref.into_iter().collect(),
        );
    }

    Ok(Json(Envelope::ok(record).with_message("User updated successfully")))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RemovePictureQuery {
    /// Email of the record to edit (default: caller)
    pub email: Option<String>,
}

#[utoipa::path(
    delete,
    path = "/api/user",
    params(RemovePictureQuery),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Record without its profile picture", body = StoredUser),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not the owner or an admin"),
        (status = 404, description = "User not found")
    )
)]
pub async fn remove_profile_picture(
    State(state): State<AppState>,
    ClientAddress(ip): ClientAddress,
    Auth(user): Auth,
    QueryParams(query): QueryParams<RemovePictureQuery>,
) -> Result<Json<Envelope<StoredUser>>, ApiError> {
    let target = target_email(&user, query.email)?;

    let (record, removed_ref, had_picture) = UserRepository::new(&state.db)
        .try_update(&target, |record| {
            record.verify_access(&user)?;
            let had_picture = record.profile_picture.is_some() || record.profile_picture_ref.is_some();
            record.profile_picture = None;
            let removed_ref = record.profile_picture_ref.take();
            if had_picture {
                record.updated_at = timestamp::now();
                record.updated_by = Some(user.email.clone());
            }
            Ok::<_, AuthError>((record.clone(), removed_ref, had_picture))
        })
        .map_err(|e| state.store_error("User", e))??;

    if had_picture {
        state.audit(
            AuditEvent::new(AuditEventType::ProfilePictureRemoved)
                .with_actor(&user.user_id, &user.email)
                .with_target(&target)
                .with_ip(ip),
        );
        spawn_cleanup(
            state.media.clone(),
            Some(target.as_str()),
            removed_ref.into_iter().collect(),
        );
    }

    Ok(Json(Envelope::ok(record).with_message("Profile picture removed")))
}
