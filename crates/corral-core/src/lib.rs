//! Corral Core - Shared types for the Corral pod scheduler
//!
//! This crate provides:
//! - Pod and node accessors over the k8s-openapi types
//! - Error types with miette diagnostics
//! - Pod keys, label selectors and resource quantities
//! - Watch and scheduling events
//! - Manifest (de)serialization helpers

pub mod error;
pub mod events;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{CorralError, Result};
pub use events::{EventType, PodWatchEvent, SchedulingEvent, WatchEventType};
pub use resources::{is_valid_name, new_binding, NodeExt, PodExt, ResourceError, ResourceQuantities};
pub use types::{LabelSelector, PodKey, DEFAULT_NAMESPACE};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Binding, Node, Pod, PodCondition};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Serialize a resource to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string_pretty(resource).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}
