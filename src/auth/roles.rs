// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and the authorization policy.
//!
//! Every handler decides access through two functions: [`require_role`] for
//! role-gated operations and [`authorize_owner_or_admin`] for operations on a
//! resource that records an owner email.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::claims::AuthenticatedUser;
use super::error::AuthError;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, may change roles and list all users
/// - `User` - Normal user, can only modify own listings and profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Normal user (least privilege, assigned on registration)
    #[default]
    User,
}

impl Role {
    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Pass iff the identity's role is one of `allowed`.
pub fn require_role(identity: &AuthenticatedUser, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&identity.role) {
        return Ok(());
    }

    let required = allowed
        .iter()
        .map(Role::to_string)
        .collect::<Vec<_>>()
        .join(" or ");
    tracing::warn!(
        user_id = %identity.user_id,
        role = %identity.role,
        required = %required,
        "Role check failed"
    );
    Err(AuthError::InsufficientPermissions { required })
}

/// Pass iff the identity owns the resource or is an admin.
///
/// Owner match is case-insensitive email equality. A resource with no
/// recorded owner is admin-only.
pub fn authorize_owner_or_admin(
    identity: &AuthenticatedUser,
    owner_email: Option<&str>,
) -> Result<(), AuthError> {
    if identity.is_admin() {
        return Ok(());
    }

    let is_owner = owner_email
        .map(|owner| owner.trim().eq_ignore_ascii_case(identity.email.trim()))
        .unwrap_or(false);
    if is_owner {
        return Ok(());
    }

    tracing::warn!(
        user_id = %identity.user_id,
        email = %identity.email,
        "Ownership check failed"
    );
    Err(AuthError::InsufficientPermissions {
        required: "owner or admin".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenSource;

    fn identity(email: &str, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "user-1".to_string(),
            email: email.to_string(),
            name: "Test".to_string(),
            role,
            provider_subject: None,
            source: TokenSource::Local,
            session_id: None,
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn require_admin_rejects_non_admin() {
        let user = identity("u@example.com", Role::User);
        let result = require_role(&user, &[Role::Admin]);
        assert!(matches!(
            result,
            Err(AuthError::InsufficientPermissions { ref required }) if required == "admin"
        ));

        let admin = identity("a@example.com", Role::Admin);
        assert!(require_role(&admin, &[Role::Admin]).is_ok());
    }

    #[test]
    fn require_role_accepts_any_allowed_role() {
        let user = identity("u@example.com", Role::User);
        assert!(require_role(&user, &[Role::Admin, Role::User]).is_ok());
        assert!(require_role(&user, &[]).is_err());
    }

    #[test]
    fn owner_match_is_case_insensitive() {
        let user = identity("owner@example.com", Role::User);
        assert!(authorize_owner_or_admin(&user, Some("Owner@Example.com")).is_ok());
        assert!(authorize_owner_or_admin(&user, Some("someone@example.com")).is_err());
    }

    #[test]
    fn admin_passes_for_any_resource() {
        let admin = identity("admin@example.com", Role::Admin);
        assert!(authorize_owner_or_admin(&admin, Some("someone@example.com")).is_ok());
        assert!(authorize_owner_or_admin(&admin, None).is_ok());
    }

    #[test]
    fn ownerless_resource_is_admin_only() {
        let user = identity("u@example.com", Role::User);
        assert!(authorize_owner_or_admin(&user, None).is_err());
    }
}
