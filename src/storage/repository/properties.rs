// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Property listing repository.
//!
//! Listings are keyed by UUID. Collection queries filter and sort in memory:
//! newest first, then paginated.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{parse_id, Database, StoreResult, PROPERTIES};
use crate::storage::timestamp;

/// Default page size for listing queries.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Kind of property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Apartment,
    House,
    Villa,
    Condo,
    Townhouse,
    Land,
    Commercial,
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apartment" => Ok(Category::Apartment),
            "house" => Ok(Category::House),
            "villa" => Ok(Category::Villa),
            "condo" => Ok(Category::Condo),
            "townhouse" => Ok(Category::Townhouse),
            "land" => Ok(Category::Land),
            "commercial" => Ok(Category::Commercial),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Whether a listing is offered for rent or for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    #[default]
    Rent,
    Sale,
}

impl FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rent" => Ok(ListingType::Rent),
            "sale" => Ok(ListingType::Sale),
            other => Err(format!("unknown listing type '{other}'")),
        }
    }
}

/// A hosted listing image.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyImage {
    pub url: String,
    /// Image host public id, used for deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
}

/// Property listing stored in the document store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredProperty {
    pub id: String,
    pub title: String,
    pub location: String,
    /// Display price, kept as entered
    pub price: String,
    #[serde(default)]
    pub beds: u32,
    #[serde(default)]
    pub baths: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(rename = "type", default)]
    pub listing_type: ListingType,
    #[serde(default)]
    pub images: Vec<PropertyImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl StoredProperty {
    /// Public ids of every hosted image on this listing.
    pub fn image_refs(&self) -> Vec<String> {
        self.images
            .iter()
            .filter_map(|image| image.public_id.clone())
            .collect()
    }
}

impl crate::storage::OwnedResource for StoredProperty {
    fn owner_email(&self) -> Option<&str> {
        self.owner_email.as_deref()
    }
}

/// Filters and pagination for a collection query.
#[derive(Debug, Clone, Default)]
pub struct PropertyQuery {
    pub listing_type: Option<ListingType>,
    pub category: Option<Category>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PropertyQuery {
    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32
    }

    /// Page size, defaulting to 12 and clamped to 1..=100.
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as u32
    }

    fn matches(&self, property: &StoredProperty, location_needle: Option<&str>) -> bool {
        if self.listing_type.is_some_and(|t| t != property.listing_type) {
            return false;
        }
        if self.category.is_some_and(|c| c != property.category) {
            return false;
        }
        match location_needle {
            Some(needle) => property.location.to_lowercase().contains(needle),
            None => true,
        }
    }
}

/// Pagination metadata returned with collection queries.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    /// `ceil(total / limit)`
    pub pages: u64,
}

/// One page of listings.
#[derive(Debug, Clone)]
pub struct PropertyPage {
    pub items: Vec<StoredProperty>,
    pub pagination: Pagination,
}

/// Repository for property listings.
pub struct PropertyRepository<'a> {
    db: &'a Database,
}

impl<'a> PropertyRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new listing.
    pub fn create(&self, property: &StoredProperty) -> StoreResult<()> {
        self.db.insert_new(PROPERTIES, &property.id, property)
    }

    /// Get a listing by id. Malformed ids fail with `InvalidId`.
    pub fn get(&self, id: &str) -> StoreResult<Option<StoredProperty>> {
        let id = parse_id(id)?;
        self.db.get_doc(PROPERTIES, &id)
    }

    /// Filter, sort newest first and paginate.
    pub fn list(&self, query: &PropertyQuery) -> StoreResult<PropertyPage> {
        let needle = query
            .location
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        let mut matching: Vec<StoredProperty> = self
            .db
            .scan_docs::<StoredProperty>(PROPERTIES)?
            .into_iter()
            .filter(|p| query.matches(p, needle.as_deref()))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = query.page();
        let limit = query.limit();
        let total = matching.len() as u64;
        let skip = (page as usize - 1).saturating_mul(limit as usize);

        let items = matching
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect();

        Ok(PropertyPage {
            items,
            pagination: Pagination {
                total,
                page,
                limit,
                pages: total.div_ceil(limit as u64),
            },
        })
    }

    /// Apply `f` to an existing listing inside one write transaction.
    pub fn try_update<R, E, F>(&self, id: &str, f: F) -> StoreResult<Result<R, E>>
    where
        F: FnOnce(&mut StoredProperty) -> Result<R, E>,
    {
        let id = parse_id(id)?;
        self.db.try_modify(PROPERTIES, &id, f)
    }

    /// Delete a listing once `check` approves it. Returns the removed listing.
    pub fn try_delete<E, F>(&self, id: &str, check: F) -> StoreResult<Result<StoredProperty, E>>
    where
        F: FnOnce(&StoredProperty) -> Result<(), E>,
    {
        let id = parse_id(id)?;
        self.db.try_remove(PROPERTIES, &id, check)
    }
}
