use crate::cache::SchedulerCache;
use crate::recorder::EventRecorder;
use crate::traits::{Binder, ErrorSink, NodeLister, PodConditionUpdater, PodQueue, ScheduleAlgorithm};
use crate::SchedulerError;
use chrono::Utc;
use corral_core::k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use corral_core::{new_binding, Pod, PodCondition, PodExt, PodKey, SchedulingEvent, DEFAULT_NAMESPACE};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Condition type written on pods the scheduler could not place
pub const POD_SCHEDULED: &str = "PodScheduled";

/// Collaborators of the scheduling loop
#[derive(Clone)]
pub struct SchedulerConfig {
    pub cache: Arc<SchedulerCache>,
    pub node_lister: Arc<dyn NodeLister>,
    pub algorithm: Arc<dyn ScheduleAlgorithm>,
    pub binder: Arc<dyn Binder>,
    pub condition_updater: Arc<dyn PodConditionUpdater>,
    pub queue: Arc<dyn PodQueue>,
    pub error_sink: Arc<dyn ErrorSink>,
    pub recorder: EventRecorder,
}

/// Pod scheduler
///
/// Places one pod at a time: decide, reserve in the cache, then bind.
/// The reservation makes the decision visible to the next iteration
/// before the store confirms it.
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn cache(&self) -> &Arc<SchedulerCache> {
        &self.config.cache
    }

    /// Run the scheduler loop until cancelled or the queue closes
    ///
    /// Cancellation interrupts a blocked dequeue; a pod already dequeued
    /// finishes its iteration first.
    pub async fn run(&self, token: CancellationToken) {
        info!("Starting scheduler");

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => {
                    info!("Scheduler shutting down");
                    return;
                }
                next = self.config.queue.next() => next,
            };

            match next {
                Some(pod) => self.schedule_pod(pod).await,
                None => {
                    info!("Pod queue closed, scheduler stopping");
                    return;
                }
            }
        }
    }

    /// Dequeue and place a single pod
    ///
    /// Returns `false` once the queue is closed.
    pub async fn schedule_one(&self) -> bool {
        match self.config.queue.next().await {
            Some(pod) => {
                self.schedule_pod(pod).await;
                true
            }
            None => false,
        }
    }

    async fn schedule_pod(&self, pod: Pod) {
        let pod_key = match pod.pod_key() {
            Ok(key) => key,
            Err(e) => {
                self.handle_failure(&pod, e.into()).await;
                return;
            }
        };
        debug!("Attempting to schedule pod {}", pod_key);

        let node_name = match self
            .config
            .algorithm
            .schedule(&pod, self.config.node_lister.as_ref())
            .await
        {
            Ok(node_name) => node_name,
            Err(e) => {
                self.handle_failure(&pod, e).await;
                return;
            }
        };

        if let Err(e) = self.config.cache.reserve(&pod, &node_name) {
            self.handle_failure(&pod, e).await;
            return;
        }

        let binding = new_binding(&pod_key, &node_name);
        match self.config.binder.bind(&binding).await {
            Ok(()) => {
                info!("Bound pod {} to node {}", pod_key, node_name);
                self.config
                    .recorder
                    .record(SchedulingEvent::scheduled(pod_key, &node_name));
            }
            Err(e) => {
                let mut failed = pod;
                failed.set_assigned_node(Some(node_name.clone()));
                if let Err(forget_err) = self.config.cache.forget(&failed) {
                    error!("Failed to release reservation of pod {}: {}", pod_key, forget_err);
                }
                failed.set_assigned_node(None);

                let err = match e {
                    SchedulerError::BindingFailed { .. } => e,
                    other => SchedulerError::binding_failed(pod_key, node_name, other.to_string()),
                };
                self.handle_failure(&failed, err).await;
            }
        }
    }

    /// Deliver a terminal failure to the error sink, the pod's condition
    /// and the event recorder, once each
    async fn handle_failure(&self, pod: &Pod, err: SchedulerError) {
        let pod_key = pod.pod_key().unwrap_or_else(|_| {
            PodKey::new(
                pod.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
                "<unnamed>",
            )
        });

        self.config.error_sink.report(pod, &err);

        let condition = unschedulable_condition(&err);
        if let Err(e) = self.config.condition_updater.update(pod, &condition).await {
            warn!("Failed to update condition of pod {}: {}", pod_key, e);
        }

        self.config
            .recorder
            .record(SchedulingEvent::failed_scheduling(pod_key, err.to_string()));
    }
}

/// `PodScheduled=False` condition describing `err`
pub fn unschedulable_condition(err: &SchedulerError) -> PodCondition {
    let now = Time(Utc::now());
    PodCondition {
        type_: POD_SCHEDULED.to_string(),
        status: "False".to_string(),
        reason: Some(err.reason()),
        message: Some(err.to_string()),
        last_probe_time: Some(now.clone()),
        last_transition_time: Some(now),
    }
}
