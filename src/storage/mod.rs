// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Document Storage Module
//!
//! Persistent storage for users, property listings, reviews, inquiries and
//! audit entries in a single embedded redb database.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATABASE_PATH (redb file)
//!   users        lowercase email → User JSON
//!   properties   uuid            → Property JSON
//!   reviews      uuid            → Review JSON
//!   inquiries    uuid            → Inquiry JSON
//!   audit_log    ts_ms|uuid      → AuditEvent JSON
//! ```
//!
//! ## Important Notes
//!
//! - One `Database` handle is opened at startup and shared by all handlers
//! - Mutations of existing documents run check and write in one transaction
//! - Timestamps are stored as RFC 3339 UTC with millisecond precision

pub mod audit;
pub mod database;
pub mod ownership;
pub mod repository;
pub mod timestamp;

pub use audit::{AuditEvent, AuditEventType, AuditQueue, AuditRepository};
pub use database::{Database, StoreError, StoreResult};
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use repository::{
    Category, InquiryRepository, ListingType, Pagination, PropertyImage, PropertyQuery,
    PropertyRepository, ReviewRepository, ReviewSummary, StoredInquiry, StoredProperty,
    StoredReview, StoredUser, UserRepository,
};
