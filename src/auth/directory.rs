// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory lookup.
//!
//! Maps a verified token identity to its stored user record. Emails are
//! normalized (trimmed, NFC, lowercased) before every lookup, so the
//! directory key is the same whatever casing the token carried.

use unicode_normalization::UnicodeNormalization;

use super::claims::{AuthenticatedUser, VerifiedIdentity};
use super::error::AuthError;
use crate::storage::{Database, StoreResult, StoredUser, UserRepository};

/// Canonical form of an email address used as the directory key.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().nfc().collect::<String>().to_lowercase()
}

/// Look up a user record by email. The email is normalized first.
pub fn lookup(db: &Database, email: &str) -> StoreResult<Option<StoredUser>> {
    UserRepository::new(db).get(&normalize_email(email))
}

/// Merge a verified identity with its directory record.
///
/// Fails with [`AuthError::UserNotFound`] when no record exists.
pub fn resolve(db: &Database, verified: &VerifiedIdentity) -> Result<AuthenticatedUser, AuthError> {
    let record = lookup(db, &verified.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Directory lookup failed");
            AuthError::InternalError("directory lookup failed".to_string())
        })?
        .ok_or_else(|| {
            tracing::warn!(email = %verified.email, "Verified token has no directory record");
            AuthError::UserNotFound
        })?;

    Ok(AuthenticatedUser {
        user_id: record.id,
        email: record.email,
        name: record.name,
        role: record.role,
        provider_subject: verified
            .provider_subject
            .clone()
            .or(record.provider_subject),
        source: verified.source,
        session_id: verified.session_id.clone(),
    })
}
