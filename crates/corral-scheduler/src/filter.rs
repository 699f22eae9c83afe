use crate::types::NodeInfo;
use corral_core::{NodeExt, Pod, PodExt};
use k8s_openapi::api::core::v1::{Taint, Toleration};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Feasibility check for placing a pod on a node
pub trait FitPredicate: Send + Sync {
    /// Whether `pod` can run on the node described by `node`
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool;
}

impl<F> FitPredicate for F
where
    F: Fn(&Pod, &NodeInfo) -> bool + Send + Sync,
{
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        self(pod, node)
    }
}

fn node_label(node: &NodeInfo) -> &str {
    node.node()
        .and_then(|n| n.node_name())
        .unwrap_or("unknown")
}

/// Rejects nodes where a requested host port is already taken
pub struct PodFitsHostPorts;

impl PodFitsHostPorts {
    pub const NAME: &'static str = "PodFitsHostPorts";
}

impl FitPredicate for PodFitsHostPorts {
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        match pod.host_ports().into_iter().find(|p| node.used_ports().contains(p)) {
            Some(port) => {
                debug!("Host port {} already in use on node {}", port, node_label(node));
                false
            }
            None => true,
        }
    }
}

/// Rejects nodes whose allocatable capacity cannot absorb the pod's requests
///
/// Nodes that report no allocatable capacity are treated as unconstrained.
pub struct PodFitsResources;

impl PodFitsResources {
    pub const NAME: &'static str = "PodFitsResources";
}

impl FitPredicate for PodFitsResources {
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        let request = pod.requested_resources();
        if request.is_zero() {
            return true;
        }

        let Some(allocatable) = node.allocatable() else {
            return true;
        };
        let used = node.requested();
        let total = used + request;

        debug!(
            "Node {} has CPU: {}/{} milli, Memory: {}/{} bytes; pod requests {} milli, {} bytes",
            node_label(node),
            used.cpu_millicores,
            allocatable.cpu_millicores,
            used.memory_bytes,
            allocatable.memory_bytes,
            request.cpu_millicores,
            request.memory_bytes
        );

        if request.cpu_millicores > 0 && total.cpu_millicores > allocatable.cpu_millicores {
            debug!("Insufficient CPU on node {}", node_label(node));
            return false;
        }

        if request.memory_bytes > 0 && total.memory_bytes > allocatable.memory_bytes {
            debug!("Insufficient memory on node {}", node_label(node));
            return false;
        }

        true
    }
}

/// Requires every entry of the pod's node selector to match a node label
pub struct MatchNodeSelector;

impl MatchNodeSelector {
    pub const NAME: &'static str = "MatchNodeSelector";
}

impl FitPredicate for MatchNodeSelector {
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        let Some(selector) = pod.node_selector() else {
            return true;
        };

        let labels = node.node().and_then(|n| n.labels());
        for (key, value) in selector {
            if labels.and_then(|l| l.get(key)) != Some(value) {
                debug!(
                    "Node selector mismatch on node {}: {}={}",
                    node_label(node),
                    key,
                    value
                );
                return false;
            }
        }

        true
    }
}

/// Requires the pod to tolerate every NoSchedule/NoExecute taint of the node
pub struct PodToleratesNodeTaints;

impl PodToleratesNodeTaints {
    pub const NAME: &'static str = "PodToleratesNodeTaints";

    fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
        if let Some(effect) = toleration.effect.as_deref() {
            if !effect.is_empty() && effect != taint.effect {
                return false;
            }
        }

        match toleration.operator.as_deref() {
            Some("Exists") => toleration
                .key
                .as_deref()
                .is_none_or(|key| key.is_empty() || key == taint.key),
            _ => {
                toleration.key.as_deref() == Some(taint.key.as_str())
                    && toleration.value.as_deref().unwrap_or("")
                        == taint.value.as_deref().unwrap_or("")
            }
        }
    }
}

impl FitPredicate for PodToleratesNodeTaints {
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        let taints = match node.node().and_then(|n| n.spec.as_ref()).and_then(|s| s.taints.as_ref()) {
            Some(t) => t,
            None => return true,
        };

        let tolerations: &[Toleration] = pod
            .spec
            .as_ref()
            .and_then(|s| s.tolerations.as_deref())
            .unwrap_or(&[]);

        for taint in taints
            .iter()
            .filter(|t| t.effect == "NoSchedule" || t.effect == "NoExecute")
        {
            if !tolerations.iter().any(|tol| Self::tolerates(tol, taint)) {
                debug!(
                    "Pod does not tolerate taint {}={} on node {}",
                    taint.key,
                    taint.effect,
                    node_label(node)
                );
                return false;
            }
        }

        true
    }
}

/// Named predicates, evaluated in name order
///
/// Built once at startup and treated as immutable afterwards.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, Arc<dyn FitPredicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `predicate` under `name`, replacing any previous entry
    pub fn register(mut self, name: impl Into<String>, predicate: impl FitPredicate + 'static) -> Self {
        self.predicates.insert(name.into(), Arc::new(predicate));
        self
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.predicates.keys().map(String::as_str).collect()
    }

    /// Name of the first predicate rejecting `pod` on `node`, if any
    pub fn first_failure(&self, pod: &Pod, node: &NodeInfo) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(_, predicate)| !predicate.fits(pod, node))
            .map(|(name, _)| name.as_str())
    }
}

/// Get default filter predicates
pub fn default_predicates() -> PredicateRegistry {
    PredicateRegistry::new()
        .register(PodFitsHostPorts::NAME, PodFitsHostPorts)
        .register(PodFitsResources::NAME, PodFitsResources)
        .register(MatchNodeSelector::NAME, MatchNodeSelector)
        .register(PodToleratesNodeTaints::NAME, PodToleratesNodeTaints)
}
