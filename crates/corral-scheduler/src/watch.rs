use crate::cache::SchedulerCache;
use corral_core::{PodExt, PodWatchEvent, WatchEventType};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Apply one store event to the cache
///
/// Added and modified pods are confirmed once they carry a node name;
/// unbound pods belong to the queue, not the cache. Deleted pods are
/// removed whether or not they were ever tracked.
pub fn apply_pod_event(cache: &SchedulerCache, event: &PodWatchEvent) {
    let result = match event.event_type {
        WatchEventType::Added | WatchEventType::Modified => {
            if event.pod.assigned_node().is_none() {
                return;
            }
            cache.confirm(&event.pod).map(|_| ())
        }
        WatchEventType::Deleted => cache.remove(&event.pod).map(|_| ()),
    };

    if let Err(e) = result {
        warn!("Ignoring {:?} pod event: {}", event.event_type, e);
    }
}

/// Feed the store's pod watch stream into the cache until cancelled
///
/// Returns when the token is cancelled or the sender side is dropped. A
/// lagging receiver loses events; the gap is logged and the feed resumes.
pub async fn run_pod_watch(
    cache: Arc<SchedulerCache>,
    mut rx: broadcast::Receiver<PodWatchEvent>,
    token: CancellationToken,
) {
    info!("Starting pod watch feeder");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Pod watch feeder shutting down");
                return;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    debug!("Pod watch event {:?}", event.event_type);
                    apply_pod_event(&cache, &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Pod watch feeder lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Pod watch stream closed");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{LabelSelector, Pod, PodKey};

    fn make_pod(name: &str, node: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.spec = Some(Default::default());
        pod.set_assigned_node(node.map(str::to_string));
        pod
    }

    #[test]
    fn test_added_bound_pod_is_confirmed() {
        let cache = SchedulerCache::default();
        cache.reserve(&make_pod("foo", None), "machine1").unwrap();

        apply_pod_event(&cache, &PodWatchEvent::added(make_pod("foo", Some("machine1"))));

        assert!(!cache.is_assumed(&PodKey::new("default", "foo")));
        assert_eq!(cache.node_view("machine1").pods().len(), 1);
    }

    #[test]
    fn test_unbound_pod_is_ignored() {
        let cache = SchedulerCache::default();
        apply_pod_event(&cache, &PodWatchEvent::added(make_pod("foo", None)));
        apply_pod_event(&cache, &PodWatchEvent::modified(make_pod("foo", None)));
        assert_eq!(cache.pod_count(), 0);
    }

    #[test]
    fn test_deleted_pod_is_removed() {
        let cache = SchedulerCache::default();
        apply_pod_event(&cache, &PodWatchEvent::added(make_pod("foo", Some("machine1"))));
        apply_pod_event(&cache, &PodWatchEvent::deleted(make_pod("foo", Some("machine1"))));
        assert_eq!(cache.pod_count(), 0);

        // Deleting an unknown pod is harmless
        apply_pod_event(&cache, &PodWatchEvent::deleted(make_pod("ghost", None)));
        assert!(cache.snapshot(&LabelSelector::everything()).is_empty());
    }

    #[tokio::test]
    async fn test_feeder_applies_events_and_stops_on_close() {
        let cache = Arc::new(SchedulerCache::default());
        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(run_pod_watch(cache.clone(), rx, CancellationToken::new()));

        tx.send(PodWatchEvent::added(make_pod("foo", Some("machine1"))))
            .unwrap();
        tx.send(PodWatchEvent::modified(make_pod("bar", Some("machine2"))))
            .unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(cache.pod_count(), 2);
        assert_eq!(cache.node_names(), vec!["machine1", "machine2"]);
    }

    #[tokio::test]
    async fn test_feeder_stops_on_cancel() {
        let cache = Arc::new(SchedulerCache::default());
        let (_tx, rx) = broadcast::channel::<PodWatchEvent>(16);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_pod_watch(cache, rx, token.clone()));

        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
