// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inquiry repository.
//!
//! An inquiry is stored before its email is sent; `delivered` is flipped
//! once the mail relay accepts the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{Database, StoreResult, INQUIRIES};
use crate::storage::timestamp;

/// A message from a prospective buyer or tenant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredInquiry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_title: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub message: String,
    /// Address the inquiry was sent to
    pub recipient: String,
    #[serde(default)]
    pub delivered: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

pub struct InquiryRepository<'a> {
    db: &'a Database,
}

impl<'a> InquiryRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, inquiry: &StoredInquiry) -> StoreResult<()> {
        self.db.insert_new(INQUIRIES, &inquiry.id, inquiry)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<StoredInquiry>> {
        self.db.get_doc(INQUIRIES, id)
    }

    /// Record that the email for this inquiry was handed to the relay.
    pub fn mark_delivered(&self, id: &str) -> StoreResult<()> {
        self.db
            .try_modify(INQUIRIES, id, |inquiry: &mut StoredInquiry| {
                inquiry.delivered = true;
                Ok::<(), std::convert::Infallible>(())
            })?
            .unwrap_or_else(|never| match never {});
        Ok(())
    }
}
