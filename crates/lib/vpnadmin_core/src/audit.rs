//! Audit trail for administrative and authentication actions.
//!
//! Handlers report through an `AuditSink`; the default sink emits structured
//! `tracing` events on the `audit` target so they can be routed separately.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Create => write!(f, "create"),
            AuditAction::Update => write!(f, "update"),
            AuditAction::Delete => write!(f, "delete"),
            AuditAction::Login => write!(f, "login"),
            AuditAction::Logout => write!(f, "logout"),
        }
    }
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: i64,
    /// Resource type, e.g. `user`.
    pub resource: &'static str,
    pub resource_id: Option<i64>,
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor_id: i64, resource: &'static str) -> Self {
        Self {
            action,
            actor_id,
            resource,
            resource_id: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_resource_id(mut self, id: i64) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);

    fn log_create(&self, actor_id: i64, resource: &'static str, id: i64, detail: serde_json::Value) {
        self.record(
            AuditEvent::new(AuditAction::Create, actor_id, resource)
                .with_resource_id(id)
                .with_detail(detail),
        );
    }

    fn log_update(&self, actor_id: i64, resource: &'static str, id: i64, detail: serde_json::Value) {
        self.record(
            AuditEvent::new(AuditAction::Update, actor_id, resource)
                .with_resource_id(id)
                .with_detail(detail),
        );
    }

    fn log_delete(&self, actor_id: i64, resource: &'static str, id: i64) {
        self.record(AuditEvent::new(AuditAction::Delete, actor_id, resource).with_resource_id(id));
    }

    fn log_login(&self, user_id: i64) {
        self.record(AuditEvent::new(AuditAction::Login, user_id, "session"));
    }

    fn log_logout(&self, user_id: i64) {
        self.record(AuditEvent::new(AuditAction::Logout, user_id, "session"));
    }
}

/// Emits each event as an `info` event on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let detail = event
            .detail
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        info!(
            target: "audit",
            action = %event.action,
            actor_id = event.actor_id,
            resource = event.resource,
            resource_id = event.resource_id,
            detail = %detail,
            "audit event"
        );
    }
}

/// Keeps events in memory; for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
