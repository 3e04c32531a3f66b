// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the document store.
//!
//! Each repository provides CRUD operations for a specific entity type,
//! using the shared `Database` for all reads and writes.

pub mod inquiries;
pub mod properties;
pub mod reviews;
pub mod users;

pub use inquiries::{InquiryRepository, StoredInquiry};
pub use properties::{
    Category, ListingType, Pagination, PropertyImage, PropertyPage, PropertyQuery,
    PropertyRepository, StoredProperty,
};
pub use reviews::{ReviewRepository, ReviewSummary, StoredReview};
pub use users::{StoredUser, UserRepository};
