use crate::manifest::ClusterManifest;
use corral_core::{LabelSelector, PodExt, PodKey, SchedulingEvent};
use corral_scheduler::mock::{
    NoopConditionUpdater, RecordingBinder, RecordingErrorSink, StaticNodeLister,
};
use corral_scheduler::{
    run_pod_watch, CacheConfig, EventRecorder, EventRecorderConfig, GenericScheduler, PodFifo,
    Scheduler, SchedulerCache, SchedulerConfig,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for a cancelled background task; `false` if it failed or hung
async fn join_background(name: &str, task: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("{} task failed: {}", name, e);
            false
        }
        Err(_) => {
            warn!("{} did not stop within shutdown timeout", name);
            false
        }
    }
}

/// A pod the simulation placed
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub pod: PodKey,
    pub node: String,
}

/// A pod the simulation could not place
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub pod: Option<PodKey>,
    pub reason: String,
    pub message: String,
}

/// Outcome of scheduling every pod of a manifest once
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub placements: Vec<Placement>,
    pub failures: Vec<Failure>,
    /// Pods the cache holds as confirmed by the end of the run
    pub confirmed: usize,
    pub events: Vec<SchedulingEvent>,
}

/// Schedule every manifest pod against the manifest nodes
///
/// Binding plays the role of the store: each accepted binding is echoed
/// on the pod watch stream and fed back into the cache as a confirmation.
pub async fn simulate(manifest: ClusterManifest, cache_config: CacheConfig) -> miette::Result<SimulationReport> {
    let pod_count = manifest.pods.len();
    info!(
        "Simulating {} pods on {} nodes",
        pod_count,
        manifest.nodes.len()
    );

    let token = CancellationToken::new();
    let cache = Arc::new(SchedulerCache::new(cache_config));

    let (watch_tx, watch_rx) = broadcast::channel(pod_count.max(1));
    let feeder = tokio::spawn(run_pod_watch(cache.clone(), watch_rx, token.clone()));

    let sweeper = {
        let cache = cache.clone();
        let token = token.clone();
        tokio::spawn(async move { cache.run_sweeper(token).await })
    };

    let binder = Arc::new(RecordingBinder::with_watch(watch_tx));
    let queue = Arc::new(PodFifo::new());
    for pod in manifest.pods {
        binder.track(&pod)?;
        queue.add(pod)?;
    }
    queue.close();

    let recorder = EventRecorder::new(EventRecorderConfig {
        capacity: pod_count.max(1),
    });
    let mut events_rx = recorder.subscribe();
    let errors = Arc::new(RecordingErrorSink::new());

    let scheduler = Scheduler::new(SchedulerConfig {
        cache: cache.clone(),
        node_lister: Arc::new(StaticNodeLister::new(manifest.nodes)),
        algorithm: Arc::new(GenericScheduler::with_defaults(cache.clone())),
        binder: binder.clone(),
        condition_updater: Arc::new(NoopConditionUpdater),
        queue,
        error_sink: errors.clone(),
        recorder,
    });
    scheduler.run(token.clone()).await;

    let placements = binder
        .placements()
        .into_iter()
        .map(|(pod, node)| Placement { pod, node })
        .collect();

    // Dropping the last sender lets the feeder drain the stream and stop
    drop(scheduler);
    drop(binder);
    if let Err(e) = feeder.await {
        warn!("Pod watch feeder task failed: {}", e);
    }

    token.cancel();
    join_background("Sweeper", sweeper, SHUTDOWN_TIMEOUT).await;

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }

    let failures = errors
        .reports()
        .into_iter()
        .map(|report| Failure {
            pod: report.pod.pod_key().ok(),
            reason: report.reason,
            message: report.message,
        })
        .collect();

    let confirmed = cache
        .snapshot(&LabelSelector::everything())
        .iter()
        .filter_map(|pod| pod.pod_key().ok())
        .filter(|key| !cache.is_assumed(key))
        .count();

    Ok(SimulationReport {
        placements,
        failures,
        confirmed,
        events,
    })
}
