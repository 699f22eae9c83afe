pub mod quantities;

pub use quantities::ResourceQuantities;

use crate::types::{PodKey, DEFAULT_NAMESPACE};
use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Base validation for scheduler inputs
pub fn validate_base(metadata: &ObjectMeta) -> Result<(), ResourceError> {
    let name = metadata
        .name
        .as_ref()
        .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;

    if !is_valid_name(name) {
        return Err(ResourceError::InvalidName(name.clone()));
    }

    if let Some(namespace) = &metadata.namespace {
        if !is_valid_name(namespace) {
            return Err(ResourceError::InvalidNamespace(namespace.clone()));
        }
    }

    Ok(())
}

/// Resource-related errors
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Validate a Kubernetes resource name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    // Must contain only lowercase alphanumeric, '-', or '.'
    // Must start and end with alphanumeric
    let chars: Vec<char> = name.chars().collect();

    if !chars[0].is_ascii_lowercase() && !chars[0].is_ascii_digit() {
        return false;
    }

    if !chars[chars.len() - 1].is_ascii_lowercase() && !chars[chars.len() - 1].is_ascii_digit() {
        return false;
    }

    chars
        .iter()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.')
}

/// Scheduler-facing accessors for pods
pub trait PodExt {
    /// Key identifying the pod (namespace defaults to "default")
    fn pod_key(&self) -> Result<PodKey, ResourceError>;

    /// Node the pod is placed on, if any
    fn assigned_node(&self) -> Option<&str>;

    /// Set or clear `spec.nodeName`
    fn set_assigned_node(&mut self, node_name: Option<String>);

    /// Host ports requested by any container (zero ports are ignored)
    fn host_ports(&self) -> Vec<i32>;

    /// Sum of container resource requests
    fn requested_resources(&self) -> ResourceQuantities;

    /// Node selector of the pod spec
    fn node_selector(&self) -> Option<&BTreeMap<String, String>>;

    /// Validate the fields the scheduler depends on
    fn validate(&self) -> Result<(), ResourceError>;
}

impl PodExt for Pod {
    fn pod_key(&self) -> Result<PodKey, ResourceError> {
        let name = self
            .metadata
            .name
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;
        let namespace = self
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE);

        Ok(PodKey::new(namespace, name))
    }

    fn assigned_node(&self) -> Option<&str> {
        self.spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .filter(|n| !n.is_empty())
    }

    fn set_assigned_node(&mut self, node_name: Option<String>) {
        self.spec.get_or_insert_with(Default::default).node_name = node_name;
    }

    fn host_ports(&self) -> Vec<i32> {
        self.spec
            .iter()
            .flat_map(|s| s.containers.iter())
            .flat_map(|c| c.ports.iter().flatten())
            .filter_map(|p| p.host_port)
            .filter(|port| *port > 0)
            .collect()
    }

    fn requested_resources(&self) -> ResourceQuantities {
        let mut total = ResourceQuantities::default();

        for container in self.spec.iter().flat_map(|s| s.containers.iter()) {
            if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
                total += ResourceQuantities::from_k8s_resource_map(requests);
            }
        }

        total
    }

    fn node_selector(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.as_ref().and_then(|s| s.node_selector.as_ref())
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        match &self.spec {
            Some(spec) if spec.containers.is_empty() => Err(ResourceError::ValidationFailed(
                "Pod must have at least one container".to_string(),
            )),
            Some(_) => Ok(()),
            None => Err(ResourceError::MissingField("spec".to_string())),
        }
    }
}

/// Scheduler-facing accessors for nodes
pub trait NodeExt {
    /// Node name, if set
    fn node_name(&self) -> Option<&str>;

    /// Allocatable capacity; `None` when the node does not report any
    fn allocatable(&self) -> Option<ResourceQuantities>;

    /// Node labels
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
}

impl NodeExt for Node {
    fn node_name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    fn allocatable(&self) -> Option<ResourceQuantities> {
        self.status
            .as_ref()
            .and_then(|s| s.allocatable.as_ref())
            .map(ResourceQuantities::from_k8s_resource_map)
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }
}

/// Build the binding that places `pod` on `node_name`
pub fn new_binding(key: &PodKey, node_name: &str) -> Binding {
    Binding {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            ..Default::default()
        },
        target: ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(node_name.to_string()),
            ..Default::default()
        },
    }
}
