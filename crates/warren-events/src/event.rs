//! Audit events recorded on cluster-relevant state changes.
//!
//! Events are appended to a capped collection and never read back by this
//! core: the stream is a write-only audit trail consumed by peer nodes and
//! external tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use warren_data::CappedStore;

use crate::error::{EventError, EventResult};

/// Capped stream holding the audit trail.
pub const EVENTS_STREAM: &str = "events";

/// Cluster-relevant state changes surfaced to the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Host-scoped configuration changed; peers must reload.
    HostsUpdated,
    /// A non-host configuration group was committed.
    SettingsChanged,
    /// The capped log streams were dropped and recreated.
    LogsCleared,
}

impl EventKind {
    /// Machine-friendly discriminator stored in the audit payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostsUpdated => "hosts_updated",
            Self::SettingsChanged => "settings_changed",
            Self::LogsCleared => "logs_cleared",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// What changed.
    pub kind: EventKind,
    /// When the change was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional identifier of the affected resource.
    pub resource_id: Option<String>,
}

impl Event {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            resource_id: None,
        }
    }

    /// Attach the affected resource identifier.
    #[must_use]
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Append-only store over the capped audit stream.
#[derive(Debug, Clone)]
pub struct EventStore {
    capped: CappedStore,
}

impl EventStore {
    /// Wrap a capped store.
    #[must_use]
    pub const fn new(capped: CappedStore) -> Self {
        Self { capped }
    }

    /// Append an event to the audit trail.
    ///
    /// Fire-and-forget with respect to consumers: nothing waits on delivery,
    /// and the capped stream evicts the oldest records on overflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the append fails.
    pub async fn publish(&self, event: &Event) -> EventResult<i64> {
        let payload = json!({
            "kind": event.kind.as_str(),
            "resource_id": event.resource_id,
        });
        self.capped
            .append(EVENTS_STREAM, event.timestamp, &payload)
            .await
            .map_err(EventError::data("events.publish"))
    }
}
