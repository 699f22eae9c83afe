use crate::error::{Result, SchedulerError};
use crate::traits::{Binder, ErrorSink, NodeLister, PodConditionUpdater};
use async_trait::async_trait;
use corral_core::{Binding, Node, Pod, PodCondition, PodExt, PodKey, PodWatchEvent, DEFAULT_NAMESPACE};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

fn binding_target(binding: &Binding) -> (PodKey, String) {
    let key = PodKey::new(
        binding
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE),
        binding.metadata.name.as_deref().unwrap_or_default(),
    );
    let node_name = binding.target.name.clone().unwrap_or_default();
    (key, node_name)
}

/// Node lister over a fixed, replaceable set of nodes
#[derive(Debug, Default)]
pub struct StaticNodeLister {
    nodes: Mutex<Vec<Node>>,
}

impl StaticNodeLister {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.lock() = nodes;
    }
}

impl NodeLister for StaticNodeLister {
    fn list(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.lock().clone())
    }
}

/// In-memory binder that records every accepted binding
///
/// When given a watch channel it also plays the store: each accepted
/// binding is published as a MODIFIED event for the bound pod. Pods made
/// known through `track` are published in full, others as a bare name
/// and node.
#[derive(Debug, Default)]
pub struct RecordingBinder {
    bindings: Mutex<Vec<Binding>>,
    failure: Mutex<Option<String>>,
    pods: Mutex<HashMap<PodKey, Pod>>,
    watch_tx: Option<broadcast::Sender<PodWatchEvent>>,
}

impl RecordingBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish accepted bindings on `tx`
    pub fn with_watch(tx: broadcast::Sender<PodWatchEvent>) -> Self {
        Self {
            watch_tx: Some(tx),
            ..Default::default()
        }
    }

    /// Reject every binding with `message` until cleared
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Remember the full pod so the published event carries its spec
    pub fn track(&self, pod: &Pod) -> Result<()> {
        let key = pod.pod_key()?;
        self.pods.lock().insert(key, pod.clone());
        Ok(())
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().clone()
    }

    /// Accepted placements as (pod key, node name), in bind order
    pub fn placements(&self) -> Vec<(PodKey, String)> {
        self.bindings.lock().iter().map(binding_target).collect()
    }

    fn bound_pod(&self, key: &PodKey, node_name: &str) -> Pod {
        let mut pod = self.pods.lock().get(key).cloned().unwrap_or_else(|| {
            let mut pod = Pod::default();
            pod.metadata.name = Some(key.name.clone());
            pod.metadata.namespace = Some(key.namespace.clone());
            pod
        });
        pod.set_assigned_node(Some(node_name.to_string()));
        pod
    }
}

#[async_trait]
impl Binder for RecordingBinder {
    async fn bind(&self, binding: &Binding) -> Result<()> {
        let (key, node_name) = binding_target(binding);

        if let Some(message) = self.failure.lock().clone() {
            return Err(SchedulerError::binding_failed(key, node_name, message));
        }

        self.bindings.lock().push(binding.clone());
        debug!("Mock: bound pod {} to node {}", key, node_name);

        if let Some(tx) = &self.watch_tx {
            let pod = self.bound_pod(&key, &node_name);
            if tx.send(PodWatchEvent::modified(pod)).is_err() {
                debug!("Mock: no watch subscribers for pod {}", key);
            }
        }

        Ok(())
    }
}

/// Condition updater that accepts and discards every update
#[derive(Debug, Default)]
pub struct NoopConditionUpdater;

#[async_trait]
impl PodConditionUpdater for NoopConditionUpdater {
    async fn update(&self, _pod: &Pod, _condition: &PodCondition) -> Result<()> {
        Ok(())
    }
}

/// Condition updater that records each update, optionally failing them
#[derive(Debug, Default)]
pub struct RecordingConditionUpdater {
    updates: Mutex<Vec<(PodKey, PodCondition)>>,
    fail: Mutex<bool>,
}

impl RecordingConditionUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn updates(&self) -> Vec<(PodKey, PodCondition)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl PodConditionUpdater for RecordingConditionUpdater {
    async fn update(&self, pod: &Pod, condition: &PodCondition) -> Result<()> {
        let key = pod.pod_key()?;
        if *self.fail.lock() {
            return Err(SchedulerError::condition_update_failed(key, "store unavailable"));
        }
        self.updates.lock().push((key, condition.clone()));
        Ok(())
    }
}

/// One pod handed to an error sink
#[derive(Debug, Clone)]
pub struct ReportedError {
    pub pod: Pod,
    pub reason: String,
    pub message: String,
}

/// Error sink that keeps every report for inspection
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    reports: Mutex<Vec<ReportedError>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ReportedError> {
        self.reports.lock().clone()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, pod: &Pod, error: &SchedulerError) {
        self.reports.lock().push(ReportedError {
            pod: pod.clone(),
            reason: error.reason(),
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::new_binding;

    fn make_pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.metadata.labels = Some([("app".to_string(), name.to_string())].into());
        pod
    }

    #[tokio::test]
    async fn test_binder_records_and_publishes() {
        let (tx, mut rx) = broadcast::channel(8);
        let binder = RecordingBinder::with_watch(tx);
        binder.track(&make_pod("foo")).unwrap();

        binder
            .bind(&new_binding(&PodKey::new("default", "foo"), "machine1"))
            .await
            .unwrap();

        assert_eq!(
            binder.placements(),
            vec![(PodKey::new("default", "foo"), "machine1".to_string())]
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.pod.assigned_node(), Some("machine1"));
        assert!(event.pod.metadata.labels.is_some());
    }

    #[tokio::test]
    async fn test_binder_failure() {
        let binder = RecordingBinder::new();
        binder.set_failure(Some("binder".to_string()));

        let err = binder
            .bind(&new_binding(&PodKey::new("default", "foo"), "machine1"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "BindingError");
        assert!(binder.bindings().is_empty());

        binder.set_failure(None);
        binder
            .bind(&new_binding(&PodKey::new("default", "foo"), "machine1"))
            .await
            .unwrap();
        assert_eq!(binder.bindings().len(), 1);
    }

    #[test]
    fn test_error_sink_records_reason() {
        let sink = RecordingErrorSink::new();
        sink.report(&make_pod("foo"), &SchedulerError::NoNodesAvailable);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].reason, "NoNodesAvailable");
    }

    #[test]
    fn test_static_lister_replaces_nodes() {
        let lister = StaticNodeLister::default();
        assert!(lister.list().unwrap().is_empty());

        let mut node = Node::default();
        node.metadata.name = Some("machine1".to_string());
        lister.set_nodes(vec![node]);
        assert_eq!(lister.list().unwrap().len(), 1);
    }
}
