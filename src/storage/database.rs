// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded document store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: lowercase email → serialized StoredUser
//! - `properties`: property id → serialized StoredProperty
//! - `reviews`: review id → serialized StoredReview
//! - `inquiries`: inquiry id → serialized StoredInquiry
//! - `audit_log`: `timestamp_ms|event_id` → serialized AuditEvent
//!
//! Documents are stored as JSON bytes. Every mutation of an existing document
//! reads, checks and writes inside a single write transaction, so a document
//! cannot disappear between the existence check and the write.

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// A table of JSON documents keyed by string.
pub type DocTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub const USERS: DocTable = TableDefinition::new("users");
pub const PROPERTIES: DocTable = TableDefinition::new("properties");
pub const REVIEWS: DocTable = TableDefinition::new("reviews");
pub const INQUIRIES: DocTable = TableDefinition::new("inquiries");

/// Append-only audit entries. Keys sort chronologically.
pub const AUDIT_LOG: DocTable = TableDefinition::new("audit_log");

const ALL_TABLES: [DocTable; 5] = [USERS, PROPERTIES, REVIEWS, INQUIRIES, AUDIT_LOG];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid id: {0}")]
    InvalidId(String),
}

impl StoreError {
    /// Whether the failure means the store itself is unusable right now.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::RedbDatabase(_)
                | StoreError::RedbTransaction(_)
                | StoreError::RedbTable(_)
                | StoreError::RedbStorage(_)
                | StoreError::RedbCommit(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Parse a document id, rejecting anything that is not a UUID.
pub fn parse_id(raw: &str) -> StoreResult<String> {
    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| StoreError::InvalidId(raw.to_string()))
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID document database.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        for table in ALL_TABLES {
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Confirm a read transaction can be opened against the users table.
    pub fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }

    /// Fetch and deserialize one document.
    pub fn get_doc<T: DeserializeOwned>(&self, table: DocTable, key: &str) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let tbl = read_txn.open_table(table)?;
        match tbl.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a document.
    pub fn put_doc<T: Serialize>(&self, table: DocTable, key: &str, doc: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut tbl = write_txn.open_table(table)?;
            tbl.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Insert a document, failing with `AlreadyExists` if the key is taken.
    pub fn insert_new<T: Serialize>(&self, table: DocTable, key: &str, doc: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut tbl = write_txn.open_table(table)?;
            if tbl.get(key)?.is_some() {
                return Err(StoreError::AlreadyExists(format!("{} {key}", table.name())));
            }
            tbl.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Deserialize every document in a table, in key order.
    pub fn scan_docs<T: DeserializeOwned>(&self, table: DocTable) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let tbl = read_txn.open_table(table)?;

        let mut docs = Vec::new();
        for entry in tbl.iter()? {
            let (_, value) = entry?;
            docs.push(serde_json::from_slice(value.value())?);
        }
        Ok(docs)
    }

    /// Read-modify-write one document inside a single write transaction.
    ///
    /// `f` may reject the change by returning `Err`; the transaction is then
    /// aborted and the rejection is returned as `Ok(Err(_))`. A missing
    /// document yields `StoreError::NotFound` without calling `f`.
    pub fn try_modify<T, R, E, F>(&self, table: DocTable, key: &str, f: F) -> StoreResult<Result<R, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tbl = write_txn.open_table(table)?;
            let bytes = match tbl.get(key)? {
                Some(value) => value.value().to_vec(),
                None => return Err(StoreError::NotFound(format!("{} {key}", table.name()))),
            };

            let mut doc: T = serde_json::from_slice(&bytes)?;
            match f(&mut doc) {
                Ok(result) => {
                    let json = serde_json::to_vec(&doc)?;
                    tbl.insert(key, json.as_slice())?;
                    Ok(result)
                }
                Err(rejection) => Err(rejection),
            }
        };

        match outcome {
            Ok(result) => {
                write_txn.commit()?;
                Ok(Ok(result))
            }
            Err(rejection) => {
                write_txn.abort()?;
                Ok(Err(rejection))
            }
        }
    }

    /// Remove one document after `check` approves it, inside a single write
    /// transaction. Returns the removed document.
    pub fn try_remove<T, E, F>(&self, table: DocTable, key: &str, check: F) -> StoreResult<Result<T, E>>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> Result<(), E>,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tbl = write_txn.open_table(table)?;
            let bytes = match tbl.get(key)? {
                Some(value) => value.value().to_vec(),
                None => return Err(StoreError::NotFound(format!("{} {key}", table.name()))),
            };

            let doc: T = serde_json::from_slice(&bytes)?;
            match check(&doc) {
                Ok(()) => {
                    tbl.remove(key)?;
                    Ok(doc)
                }
                Err(rejection) => Err(rejection),
            }
        };

        match outcome {
            Ok(doc) => {
                write_txn.commit()?;
                Ok(Ok(doc))
            }
            Err(rejection) => {
                write_txn.abort()?;
                Ok(Err(rejection))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn doc(name: &str) -> Doc {
        Doc {
            name: name.to_string(),
            count: 0,
        }
    }

    #[test]
    fn put_and_get_document() {
        let (db, _dir) = temp_db();
        db.put_doc(PROPERTIES, "a", &doc("first")).unwrap();

        let loaded: Doc = db.get_doc(PROPERTIES, "a").unwrap().unwrap();
        assert_eq!(loaded, doc("first"));
        assert!(db.get_doc::<Doc>(PROPERTIES, "missing").unwrap().is_none());
    }

    #[test]
    fn insert_new_rejects_duplicates() {
        let (db, _dir) = temp_db();
        db.insert_new(USERS, "a@example.com", &doc("a")).unwrap();

        let result = db.insert_new(USERS, "a@example.com", &doc("b"));
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));

        let kept: Doc = db.get_doc(USERS, "a@example.com").unwrap().unwrap();
        assert_eq!(kept.name, "a");
    }

    #[test]
    fn scan_returns_documents_in_key_order() {
        let (db, _dir) = temp_db();
        db.put_doc(REVIEWS, "b", &doc("second")).unwrap();
        db.put_doc(REVIEWS, "a", &doc("first")).unwrap();

        let docs: Vec<Doc> = db.scan_docs(REVIEWS).unwrap();
        assert_eq!(docs, vec![doc("first"), doc("second")]);
    }

    #[test]
    fn try_modify_commits_accepted_changes() {
        let (db, _dir) = temp_db();
        db.put_doc(PROPERTIES, "a", &doc("first")).unwrap();

        let outcome = db
            .try_modify(PROPERTIES, "a", |d: &mut Doc| -> Result<u32, ()> {
                d.count += 1;
                Ok(d.count)
            })
            .unwrap();
        assert_eq!(outcome, Ok(1));

        let loaded: Doc = db.get_doc(PROPERTIES, "a").unwrap().unwrap();
        assert_eq!(loaded.count, 1);
    }

    #[test]
    fn try_modify_rejection_leaves_document_untouched() {
        let (db, _dir) = temp_db();
        db.put_doc(PROPERTIES, "a", &doc("first")).unwrap();

        let outcome = db
            .try_modify(PROPERTIES, "a", |d: &mut Doc| -> Result<(), &str> {
                d.count = 99;
                Err("denied")
            })
            .unwrap();
        assert_eq!(outcome, Err("denied"));

        let loaded: Doc = db.get_doc(PROPERTIES, "a").unwrap().unwrap();
        assert_eq!(loaded.count, 0);
    }

    #[test]
    fn try_modify_missing_document_is_not_found() {
        let (db, _dir) = temp_db();
        let result = db.try_modify(PROPERTIES, "nope", |_: &mut Doc| -> Result<(), ()> { Ok(()) });
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn try_remove_respects_check() {
        let (db, _dir) = temp_db();
        db.put_doc(PROPERTIES, "a", &doc("first")).unwrap();

        let denied = db
            .try_remove(PROPERTIES, "a", |_: &Doc| Err("denied"))
            .unwrap();
        assert!(denied.is_err());
        assert!(db.get_doc::<Doc>(PROPERTIES, "a").unwrap().is_some());

        let removed = db
            .try_remove(PROPERTIES, "a", |_: &Doc| Ok::<(), ()>(()))
            .unwrap()
            .unwrap();
        assert_eq!(removed.name, "first");
        assert!(db.get_doc::<Doc>(PROPERTIES, "a").unwrap().is_none());

        let again = db.try_remove(PROPERTIES, "a", |_: &Doc| Ok::<(), ()>(()));
        assert!(matches!(again, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn parse_id_requires_uuid() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_id(&id).unwrap(), id);
        assert!(matches!(parse_id("not-a-uuid"), Err(StoreError::InvalidId(_))));
    }

    #[test]
    fn health_check_passes_on_open_database() {
        let (db, _dir) = temp_db();
        db.health_check().unwrap();
        assert!(!StoreError::NotFound("x".into()).is_unavailable());
    }
}
