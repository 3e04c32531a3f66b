// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for stored resources.
//!
//! Resources expose the email of their owner; access is decided by the
//! single owner-or-admin predicate in [`crate::auth::roles`].

use crate::auth::roles::authorize_owner_or_admin;
use crate::auth::{AuthError, AuthenticatedUser};

/// Trait for resources that record an owner.
pub trait OwnedResource {
    /// The owner's email, if one was recorded.
    fn owner_email(&self) -> Option<&str>;
}

/// Trait for enforcing ownership on storage operations.
pub trait OwnershipEnforcer {
    /// Verify that the user owns this resource or is an admin.
    ///
    /// # Errors
    /// Returns `AuthError::InsufficientPermissions` otherwise.
    fn verify_access(&self, user: &AuthenticatedUser) -> Result<(), AuthError>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_access(&self, user: &AuthenticatedUser) -> Result<(), AuthError> {
        authorize_owner_or_admin(user, self.owner_email())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenSource;
    use crate::auth::Role;

    struct TestResource {
        owner: Option<String>,
    }

    impl OwnedResource for TestResource {
        fn owner_email(&self) -> Option<&str> {
            self.owner.as_deref()
        }
    }

    fn make_user(email: &str, role: Role) -> AuthenticatedUser {
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
    fn ownership_verification_passes_for_owner() {
        let resource = TestResource {
            owner: Some("Owner@Example.com".to_string()),
        };
        let user = make_user("owner@example.com", Role::User);
        assert!(resource.verify_access(&user).is_ok());
    }

    #[test]
    fn ownership_verification_fails_for_non_owner() {
        let resource = TestResource {
            owner: Some("owner@example.com".to_string()),
        };
        let user = make_user("other@example.com", Role::User);

        let result = resource.verify_access(&user);
        assert!(matches!(result, Err(AuthError::InsufficientPermissions { .. })));
    }

    #[test]
    fn admin_passes_for_ownerless_resource() {
        let resource = TestResource { owner: None };
        assert!(resource
            .verify_access(&make_user("admin@example.com", Role::Admin))
            .is_ok());
        assert!(resource
            .verify_access(&make_user("user@example.com", Role::User))
            .is_err());
    }
}
