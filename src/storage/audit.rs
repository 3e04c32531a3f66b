// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Handlers hand events to an [`AuditQueue`]; a single writer task appends
//! them to the `audit_log` table. Delivery is at-most-once: when the queue
//! is full or closed the event is dropped with a warning, and write failures
//! are logged but never reach the request that produced the event.
//!
//! ## Shutdown
//!
//! The writer stops when the `CancellationToken` fires, after draining
//! whatever is already queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::database::{Database, StoreResult, AUDIT_LOG};
use super::timestamp;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RoleChanged,
    UsersListed,
    ProfileUpdated,
    ProfilePictureChanged,
    ProfilePictureRemoved,
    PropertyDeleted,
    MediaUploaded,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Directory id of the acting user.
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    /// Affected resource (user email or property id).
    pub target: Option<String>,
    /// Source address of the request (if available).
    pub ip_address: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: timestamp::now(),
            event_type,
            actor_id: None,
            actor_email: None,
            target: None,
            ip_address: None,
            details: None,
        }
    }

    /// Set the acting user.
    pub fn with_actor(mut self, actor_id: impl Into<String>, actor_email: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self.actor_email = Some(actor_email.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Table key: zero-padded millisecond timestamp, then the event id.
    fn storage_key(&self) -> String {
        format!("{:020}|{}", self.timestamp.timestamp_millis().max(0), self.event_id)
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    db: &'a Database,
}

impl<'a> AuditRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append one event.
    pub fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        self.db.put_doc(AUDIT_LOG, &event.storage_key(), event)
    }

    /// All events, oldest first.
    pub fn list(&self) -> StoreResult<Vec<AuditEvent>> {
        self.db.scan_docs(AUDIT_LOG)
    }
}

/// Sending half of the audit pipeline. Cheap to clone.
#[derive(Clone)]
pub struct AuditQueue {
    tx: mpsc::Sender<AuditEvent>,
}

/// Receiving half; owns the single writer loop.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEvent>,
}

impl AuditQueue {
    /// Create a queue without starting its writer.
    pub fn channel(capacity: usize) -> (Self, AuditWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, AuditWriter { rx })
    }

    /// Create a queue and spawn its writer task.
    pub fn start(
        db: Arc<Database>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (queue, writer) = Self::channel(capacity);
        let handle = tokio::spawn(writer.run(db, shutdown));
        (queue, handle)
    }

    /// Enqueue an event without waiting. Returns whether it was accepted.
    pub fn record(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event_type = ?event.event_type, event_id = %event.event_id, "Audit queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(event_type = ?event.event_type, event_id = %event.event_id, "Audit queue closed, event dropped");
                false
            }
        }
    }
}

impl AuditWriter {
    /// Run the writer loop until the cancellation token is triggered or
    /// every sender is gone.
    pub async fn run(mut self, db: Arc<Database>, shutdown: CancellationToken) {
        info!("Audit writer starting");

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(event) => write_event(&db, &event),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    self.rx.close();
                    while let Some(event) = self.rx.recv().await {
                        write_event(&db, &event);
                    }
                    break;
                }
            }
        }

        info!("Audit writer shutting down");
    }
}

fn write_event(db: &Database, event: &AuditEvent) {
    if let Err(e) = AuditRepository::new(db).append(event) {
        warn!(
            event_type = ?event.event_type,
            event_id = %event.event_id,
            error = %e,
            "Failed to persist audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (Arc<Database>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (Arc::new(db), dir)
    }

    #[test]
    fn build_audit_event() {
        let event = AuditEvent::new(AuditEventType::RoleChanged)
            .with_actor("user-1", "admin@example.com")
            .with_target("jane@example.com")
            .with_ip("192.168.1.1")
            .with_details(serde_json::json!({ "from": "user", "to": "admin" }));

        assert_eq!(event.event_type, AuditEventType::RoleChanged);
        assert_eq!(event.actor_email.as_deref(), Some("admin@example.com"));
        assert_eq!(event.target.as_deref(), Some("jane@example.com"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "role_changed");
    }

    #[test]
    fn append_and_list_in_order() {
        let (db, _dir) = temp_db();
        let repo = AuditRepository::new(&db);

        let mut first = AuditEvent::new(AuditEventType::UsersListed);
        first.timestamp = first.timestamp - chrono::Duration::seconds(5);
        let second = AuditEvent::new(AuditEventType::PropertyDeleted);
        repo.append(&second).unwrap();
        repo.append(&first).unwrap();

        let events = repo.list().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::UsersListed);
        assert_eq!(events[1].event_type, AuditEventType::PropertyDeleted);
    }

    #[tokio::test]
    async fn queue_drains_on_shutdown() {
        let (db, _dir) = temp_db();
        let shutdown = CancellationToken::new();
        let (queue, handle) = AuditQueue::start(Arc::clone(&db), 16, shutdown.clone());

        for _ in 0..3 {
            assert!(queue.record(AuditEvent::new(AuditEventType::ProfileUpdated)));
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(AuditRepository::new(&db).list().unwrap().len(), 3);
        assert!(!queue.record(AuditEvent::new(AuditEventType::ProfileUpdated)));
    }

    #[test]
    fn full_queue_drops_events() {
        let (queue, _writer) = AuditQueue::channel(1);
        assert!(queue.record(AuditEvent::new(AuditEventType::UsersListed)));
        assert!(!queue.record(AuditEvent::new(AuditEventType::UsersListed)));
    }
}
