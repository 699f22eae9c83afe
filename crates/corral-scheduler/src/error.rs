// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use crate::types::FailedPredicateMap;
use corral_core::{Pod, PodKey, ResourceError};
use miette::Diagnostic;
use thiserror::Error;

/// Condition reason recorded for binder failures
pub const REASON_BINDING_ERROR: &str = "BindingError";

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// The node lister returned no candidates
    #[error("No nodes available to schedule pods")]
    #[diagnostic(
        code(scheduler::no_nodes_available),
        help("Register at least one node before submitting pods")
    )]
    NoNodesAvailable,

    /// Every node was rejected by a predicate or extender
    #[error("{}", fit_error_message(.pod_key, .failed_predicates))]
    #[diagnostic(
        code(scheduler::fit_error),
        help("Check node resources, host ports, selectors and taints against the pod requirements")
    )]
    FitError {
        pod_key: PodKey,
        pod: Box<Pod>,
        failed_predicates: FailedPredicateMap,
    },

    /// Reserve was attempted on a pod the store already confirmed
    #[error("Pod {pod_key} is already bound to node {node_name}")]
    #[diagnostic(
        code(scheduler::already_bound),
        help("The pod was bound concurrently; drop it from the scheduling queue")
    )]
    AlreadyBound { pod_key: PodKey, node_name: String },

    /// Pod lacks a field the cache or algorithm needs
    #[error("Invalid pod: {message}")]
    #[diagnostic(
        code(scheduler::invalid_pod),
        help("Pods need metadata.name, and confirmed pods need spec.nodeName")
    )]
    InvalidPod { message: String },

    /// Binder rejected the placement
    #[error("Binding pod {pod_key} to node {node_name} failed: {message}")]
    #[diagnostic(
        code(scheduler::binding_failed),
        help("The reservation was released; the pod will be retried by its submitter")
    )]
    BindingFailed {
        pod_key: PodKey,
        node_name: String,
        message: String,
    },

    /// An extender returned an error
    #[error("Extender {extender} failed: {message}")]
    #[diagnostic(
        code(scheduler::extender_failed),
        help("Check that the extender is reachable and healthy")
    )]
    ExtenderFailed { extender: String, message: String },

    /// Node lister failed
    #[error("Failed to list nodes: {message}")]
    #[diagnostic(
        code(scheduler::node_list_failed),
        help("Check the node informer or source of node objects")
    )]
    NodeListFailed { message: String },

    /// Condition updater failed
    #[error("Failed to update condition of pod {pod_key}: {message}")]
    #[diagnostic(
        code(scheduler::condition_update_failed),
        help("Condition updates are best effort and are not retried")
    )]
    ConditionUpdateFailed { pod_key: PodKey, message: String },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("This is an internal error")
    )]
    CoreError(#[from] corral_core::CorralError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError { message: String },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

fn fit_error_message(pod_key: &PodKey, failed: &FailedPredicateMap) -> String {
    let mut message = format!("pod ({}) failed to fit in any node", pod_key);
    for (node, predicate) in failed {
        message.push_str(&format!("\nfit failure on node ({}): {}", node, predicate));
    }
    message
}

impl SchedulerError {
    /// Create a FitError
    pub fn fit_error(pod_key: PodKey, pod: Pod, failed_predicates: FailedPredicateMap) -> Self {
        Self::FitError {
            pod_key,
            pod: Box::new(pod),
            failed_predicates,
        }
    }

    /// Create an AlreadyBound error
    pub fn already_bound(pod_key: PodKey, node_name: impl Into<String>) -> Self {
        Self::AlreadyBound {
            pod_key,
            node_name: node_name.into(),
        }
    }

    /// Create an InvalidPod error
    pub fn invalid_pod(message: impl Into<String>) -> Self {
        Self::InvalidPod {
            message: message.into(),
        }
    }

    /// Create a BindingFailed error
    pub fn binding_failed(
        pod_key: PodKey,
        node_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BindingFailed {
            pod_key,
            node_name: node_name.into(),
            message: message.into(),
        }
    }

    /// Create an ExtenderFailed error
    pub fn extender_failed(extender: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtenderFailed {
            extender: extender.into(),
            message: message.into(),
        }
    }

    /// Create a NodeListFailed error
    pub fn node_list_failed(message: impl Into<String>) -> Self {
        Self::NodeListFailed {
            message: message.into(),
        }
    }

    /// Create a ConditionUpdateFailed error
    pub fn condition_update_failed(pod_key: PodKey, message: impl Into<String>) -> Self {
        Self::ConditionUpdateFailed {
            pod_key,
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Machine-readable reason written into the pod's PodScheduled condition
    ///
    /// Fit errors report the distinct failing predicate names, sorted and
    /// comma separated.
    pub fn reason(&self) -> String {
        match self {
            Self::FitError {
                failed_predicates, ..
            } => {
                let mut names: Vec<&str> =
                    failed_predicates.values().map(String::as_str).collect();
                names.sort_unstable();
                names.dedup();
                names.join(",")
            }
            Self::BindingFailed { .. } => REASON_BINDING_ERROR.to_string(),
            Self::ExtenderFailed { .. } => "ExtenderError".to_string(),
            Self::NoNodesAvailable => "NoNodesAvailable".to_string(),
            Self::AlreadyBound { .. } => "AlreadyBound".to_string(),
            _ => "SchedulerError".to_string(),
        }
    }
}

impl From<ResourceError> for SchedulerError {
    fn from(err: ResourceError) -> Self {
        Self::invalid_pod(err.to_string())
    }
}
