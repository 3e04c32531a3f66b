// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory repository.
//!
//! Users are keyed by their normalized (lowercase) email. Records are never
//! hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::storage::database::{Database, StoreResult, USERS};
use crate::storage::timestamp;

/// User record stored in the directory.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Lowercase email, also the directory key
    pub email: String,
    pub name: String,
    /// Phone number in local format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Hosted profile picture URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    /// Image host public id of the profile picture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_ref: Option<String>,
    /// Identity provider `sub`, recorded on first sign-in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_subject: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Email of the last user to modify this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl StoredUser {
    /// A new record with role `user`. `email` must already be normalized.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = timestamp::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            name: name.into(),
            phone: None,
            role: Role::User,
            profile_picture: None,
            profile_picture_ref: None,
            provider_subject: None,
            created_at: now,
            updated_at: now,
            updated_by: None,
        }
    }
}

impl crate::storage::OwnedResource for StoredUser {
    fn owner_email(&self) -> Option<&str> {
        Some(&self.email)
    }
}

/// Repository for user records.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a user by normalized email.
    pub fn get(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        self.db.get_doc(USERS, email)
    }

    /// Create a user. Fails with `AlreadyExists` if the email is taken.
    pub fn create(&self, user: &StoredUser) -> StoreResult<()> {
        self.db.insert_new(USERS, &user.email, user)
    }

    /// Apply `f` to an existing user inside one write transaction.
    pub fn try_update<R, E, F>(&self, email: &str, f: F) -> StoreResult<Result<R, E>>
    where
        F: FnOnce(&mut StoredUser) -> Result<R, E>,
    {
        self.db.try_modify(USERS, email, f)
    }

    /// List every user, oldest first (admin view).
    pub fn list_all(&self) -> StoreResult<Vec<StoredUser>> {
        let mut users: Vec<StoredUser> = self.db.scan_docs(USERS)?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }
}
