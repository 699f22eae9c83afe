use crate::types::PodKey;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Watch event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// A pod change observed on the authoritative store's watch stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodWatchEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// The pod as recorded by the store
    pub pod: Pod,
}

impl PodWatchEvent {
    /// Create an ADDED event
    pub fn added(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Added,
            pod,
        }
    }

    /// Create a MODIFIED event
    pub fn modified(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            pod,
        }
    }

    /// Create a DELETED event
    pub fn deleted(pod: Pod) -> Self {
        Self {
            event_type: WatchEventType::Deleted,
            pod,
        }
    }
}

/// Severity of a scheduling event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// Reason recorded when a pod was bound
pub const REASON_SCHEDULED: &str = "Scheduled";
/// Reason recorded for every terminal scheduling failure
pub const REASON_FAILED_SCHEDULING: &str = "FailedScheduling";

/// An observability event emitted by the scheduling loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingEvent {
    /// Unique event id
    pub uid: Uuid,
    /// Pod the event is about
    pub pod_key: PodKey,
    pub event_type: EventType,
    /// Short machine-readable reason ("Scheduled", "FailedScheduling")
    pub reason: String,
    /// Human-readable detail
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SchedulingEvent {
    pub fn new(
        pod_key: PodKey,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            uid: Uuid::new_v4(),
            pod_key,
            event_type,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a "Scheduled" event
    pub fn scheduled(pod_key: PodKey, node_name: &str) -> Self {
        let message = format!("Successfully assigned {} to {}", pod_key, node_name);
        Self::new(pod_key, EventType::Normal, REASON_SCHEDULED, message)
    }

    /// Create a "FailedScheduling" event
    pub fn failed_scheduling(pod_key: PodKey, message: impl Into<String>) -> Self {
        Self::new(pod_key, EventType::Warning, REASON_FAILED_SCHEDULING, message)
    }
}
