// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Property review repository.
//!
//! Reviews are append-only. The property id is not checked against the
//! properties table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{Database, StoreResult, REVIEWS};
use crate::storage::timestamp;

/// A review left on a property.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredReview {
    pub id: String,
    pub property_id: String,
    /// Rating from 1 to 5
    pub rating: u8,
    pub comment: String,
    pub name: String,
    /// Reviewer email (lowercase)
    pub email: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Reviews of one property with summary figures.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub reviews: Vec<StoredReview>,
    pub count: usize,
    /// Mean rating rounded to one decimal, 0 when there are no reviews
    pub average_rating: f64,
}

pub struct ReviewRepository<'a> {
    db: &'a Database,
}

impl<'a> ReviewRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, review: &StoredReview) -> StoreResult<()> {
        self.db.insert_new(REVIEWS, &review.id, review)
    }

    /// All reviews of a property, newest first.
    pub fn list_for_property(&self, property_id: &str) -> StoreResult<ReviewSummary> {
        let mut reviews: Vec<StoredReview> = self
            .db
            .scan_docs::<StoredReview>(REVIEWS)?
            .into_iter()
            .filter(|r| r.property_id == property_id)
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let count = reviews.len();
        let average_rating = if count == 0 {
            0.0
        } else {
            let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
            (f64::from(sum) / count as f64 * 10.0).round() / 10.0
        };

        Ok(ReviewSummary {
            reviews,
            count,
            average_rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn review(property_id: &str, rating: u8, age_secs: i64) -> StoredReview {
        StoredReview {
            id: uuid::Uuid::new_v4().to_string(),
            property_id: property_id.to_string(),
            rating,
            comment: "Lovely place".to_string(),
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            created_at: timestamp::now() - chrono::Duration::seconds(age_secs),
        }
    }

    #[test]
    fn summary_counts_and_averages() {
        let (db, _dir) = temp_db();
        let repo = ReviewRepository::new(&db);
        repo.create(&review("p1", 5, 2)).unwrap();
        repo.create(&review("p1", 4, 1)).unwrap();
        repo.create(&review("p1", 4, 0)).unwrap();
        repo.create(&review("p2", 1, 0)).unwrap();

        let summary = repo.list_for_property("p1").unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average_rating, 4.3);
        assert_eq!(summary.reviews[2].rating, 5);
    }

    #[test]
    fn empty_summary_has_zero_average() {
        let (db, _dir) = temp_db();
        let summary = ReviewRepository::new(&db).list_for_property("none").unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average_rating, 0.0);
    }
}
