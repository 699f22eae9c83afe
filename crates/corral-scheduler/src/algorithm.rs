use crate::cache::SchedulerCache;
use crate::filter::{default_predicates, PredicateRegistry};
use crate::score::{default_priorities, prioritize_nodes, PriorityConfig};
use crate::traits::{NodeLister, ScheduleAlgorithm, SchedulerExtender};
use crate::types::{FailedPredicateMap, NodeInfo, ScoreResult};
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use corral_core::{Node, NodeExt, Pod, PodExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Filter, rank and select over the cache's view of each node
///
/// Performs no cache mutation; the result may be stale by the time the
/// caller acts on it.
pub struct GenericScheduler {
    cache: Arc<SchedulerCache>,
    predicates: PredicateRegistry,
    priorities: Vec<PriorityConfig>,
    extenders: Vec<Arc<dyn SchedulerExtender>>,
}

impl GenericScheduler {
    pub fn new(
        cache: Arc<SchedulerCache>,
        predicates: PredicateRegistry,
        priorities: Vec<PriorityConfig>,
        extenders: Vec<Arc<dyn SchedulerExtender>>,
    ) -> Self {
        Self {
            cache,
            predicates,
            priorities,
            extenders,
        }
    }

    /// Scheduler with the built-in predicates and priorities and no extenders
    pub fn with_defaults(cache: Arc<SchedulerCache>) -> Self {
        Self::new(cache, default_predicates(), default_priorities(), Vec::new())
    }

    /// Evaluate every predicate against every node
    ///
    /// Returns the feasible nodes with their occupancy views, in lister order,
    /// and the first failing predicate for each rejected node.
    fn find_nodes_that_fit(&self, pod: &Pod, nodes: Vec<Node>) -> (Vec<(String, NodeInfo)>, FailedPredicateMap) {
        let mut feasible = Vec::new();
        let mut failed = FailedPredicateMap::new();

        for node in nodes {
            let Some(node_name) = node.node_name().map(str::to_string) else {
                warn!("Skipping node without a name");
                continue;
            };

            let info = self.cache.node_view(&node_name).with_node(node);
            match self.predicates.first_failure(pod, &info) {
                Some(predicate) => {
                    debug!("Node {} filtered out by {}", node_name, predicate);
                    failed.insert(node_name, predicate.to_string());
                }
                None => feasible.push((node_name, info)),
            }
        }

        (feasible, failed)
    }

    async fn apply_extender_filters(
        &self,
        pod: &Pod,
        feasible: &mut Vec<(String, NodeInfo)>,
        failed: &mut FailedPredicateMap,
    ) -> Result<()> {
        for extender in &self.extenders {
            if feasible.is_empty() {
                break;
            }

            let candidates: Vec<Node> = feasible
                .iter()
                .filter_map(|(_, info)| info.node().cloned())
                .collect();
            let kept: HashSet<String> = extender
                .filter(pod, candidates)
                .await
                .map_err(|e| extender_error(extender.as_ref(), e))?
                .iter()
                .filter_map(|n| n.node_name().map(str::to_string))
                .collect();

            feasible.retain(|(name, _)| {
                if kept.contains(name) {
                    return true;
                }
                debug!("Node {} filtered out by extender {}", name, extender.name());
                failed.insert(name.clone(), format!("extender:{}", extender.name()));
                false
            });
        }

        Ok(())
    }

    async fn apply_extender_priorities(
        &self,
        pod: &Pod,
        feasible: &[(String, NodeInfo)],
        scores: &mut [ScoreResult],
    ) -> Result<()> {
        if self.extenders.is_empty() {
            return Ok(());
        }

        let nodes: Vec<Node> = feasible
            .iter()
            .filter_map(|(_, info)| info.node().cloned())
            .collect();

        for extender in &self.extenders {
            let (extender_scores, weight) = extender
                .prioritize(pod, &nodes)
                .await
                .map_err(|e| extender_error(extender.as_ref(), e))?;

            for result in extender_scores {
                if let Some(total) = scores.iter_mut().find(|s| s.node_name == result.node_name) {
                    total.score += weight * result.score;
                }
            }
        }

        Ok(())
    }
}

fn extender_error(extender: &dyn SchedulerExtender, err: SchedulerError) -> SchedulerError {
    match err {
        SchedulerError::ExtenderFailed { .. } => err,
        other => SchedulerError::extender_failed(extender.name(), other.to_string()),
    }
}

/// Pick the highest score; ties go to the lexicographically smallest node name
pub fn select_host(scores: &[ScoreResult]) -> Result<&ScoreResult> {
    scores
        .iter()
        .min_by(|a, b| b.score.cmp(&a.score).then_with(|| a.node_name.cmp(&b.node_name)))
        .ok_or_else(|| SchedulerError::internal_error("No nodes scored"))
}

#[async_trait]
impl ScheduleAlgorithm for GenericScheduler {
    async fn schedule(&self, pod: &Pod, node_lister: &dyn NodeLister) -> Result<String> {
        let pod_key = pod.pod_key()?;

        let nodes = node_lister.list()?;
        if nodes.is_empty() {
            return Err(SchedulerError::NoNodesAvailable);
        }

        let (mut feasible, mut failed) = self.find_nodes_that_fit(pod, nodes);
        self.apply_extender_filters(pod, &mut feasible, &mut failed)
            .await?;

        if feasible.is_empty() {
            return Err(SchedulerError::fit_error(pod_key, pod.clone(), failed));
        }

        debug!("Pod {} has {} feasible nodes", pod_key, feasible.len());

        let mut scores = prioritize_nodes(pod, &feasible, &self.priorities);
        self.apply_extender_priorities(pod, &feasible, &mut scores)
            .await?;

        let best = select_host(&scores)?;
        info!(
            "Selected node {} for pod {} with score {}",
            best.node_name, pod_key, best.score
        );

        Ok(best.node_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{MatchNodeSelector, PodFitsHostPorts};
    use crate::mock::StaticNodeLister;
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec};

    fn make_node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    fn pod_with_port(name: &str, port: i32) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.spec = Some(PodSpec {
            containers: vec![Container {
                name: "ctr".to_string(),
                ports: Some(vec![ContainerPort {
                    container_port: port,
                    host_port: Some(port),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        });
        pod
    }

    fn lister(names: &[&str]) -> StaticNodeLister {
        StaticNodeLister::new(names.iter().map(|n| make_node(n)).collect())
    }

    fn ports_only(cache: Arc<SchedulerCache>) -> GenericScheduler {
        GenericScheduler::new(
            cache,
            PredicateRegistry::new().register(PodFitsHostPorts::NAME, PodFitsHostPorts),
            Vec::new(),
            Vec::new(),
        )
    }

    struct FixedExtender {
        name: &'static str,
        keep: Option<Vec<&'static str>>,
        scores: Vec<(&'static str, i64)>,
        weight: i64,
        fail: bool,
    }

    #[async_trait]
    impl SchedulerExtender for FixedExtender {
        fn name(&self) -> &str {
            self.name
        }

        async fn filter(&self, _pod: &Pod, nodes: Vec<Node>) -> Result<Vec<Node>> {
            if self.fail {
                return Err(SchedulerError::internal_error("connection refused"));
            }
            Ok(match &self.keep {
                Some(keep) => nodes
                    .into_iter()
                    .filter(|n| keep.iter().any(|k| n.node_name() == Some(*k)))
                    .collect(),
                None => nodes,
            })
        }

        async fn prioritize(&self, _pod: &Pod, _nodes: &[Node]) -> Result<(Vec<ScoreResult>, i64)> {
            let scores = self
                .scores
                .iter()
                .map(|(name, score)| ScoreResult::new(*name, *score))
                .collect();
            Ok((scores, self.weight))
        }
    }

    #[tokio::test]
    async fn test_no_nodes_available() {
        let scheduler = GenericScheduler::with_defaults(Arc::new(SchedulerCache::default()));
        let result = scheduler.schedule(&pod_with_port("foo", 8080), &lister(&[])).await;
        assert!(matches!(result, Err(SchedulerError::NoNodesAvailable)));
    }

    #[tokio::test]
    async fn test_fit_error_has_one_entry_per_node() {
        let cache = Arc::new(SchedulerCache::default());
        for (i, node) in ["machine1", "machine2", "machine3"].iter().enumerate() {
            cache
                .reserve(&pod_with_port(&format!("holder-{}", i), 8080), node)
                .unwrap();
        }
        let scheduler = ports_only(cache);

        let err = scheduler
            .schedule(
                &pod_with_port("bar", 8080),
                &lister(&["machine1", "machine2", "machine3"]),
            )
            .await
            .unwrap_err();

        match err {
            SchedulerError::FitError {
                pod_key,
                failed_predicates,
                ..
            } => {
                assert_eq!(pod_key.name, "bar");
                assert_eq!(failed_predicates.len(), 3);
                assert!(failed_predicates.values().all(|p| p == PodFitsHostPorts::NAME));
            }
            other => panic!("expected FitError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fit_error_names_failing_predicate_per_node() {
        let cache = Arc::new(SchedulerCache::default());
        cache.reserve(&pod_with_port("holder", 8080), "machine1").unwrap();
        let scheduler = GenericScheduler::new(
            cache,
            PredicateRegistry::new()
                .register(PodFitsHostPorts::NAME, PodFitsHostPorts)
                .register(MatchNodeSelector::NAME, MatchNodeSelector),
            Vec::new(),
            Vec::new(),
        );

        let mut ssd = make_node("machine1");
        ssd.metadata.labels = Some([("disk".to_string(), "ssd".to_string())].into());
        let nodes = StaticNodeLister::new(vec![ssd, make_node("machine2")]);

        let mut pod = pod_with_port("bar", 8080);
        pod.spec.as_mut().unwrap().node_selector =
            Some([("disk".to_string(), "ssd".to_string())].into());

        let err = scheduler.schedule(&pod, &nodes).await.unwrap_err();
        assert_eq!(err.reason(), "MatchNodeSelector,PodFitsHostPorts");
        match err {
            SchedulerError::FitError {
                failed_predicates, ..
            } => {
                assert_eq!(failed_predicates.len(), 2);
                assert_eq!(failed_predicates["machine1"], PodFitsHostPorts::NAME);
                assert_eq!(failed_predicates["machine2"], MatchNodeSelector::NAME);
            }
            other => panic!("expected FitError, got {:?}", other),
        }
    }

    struct FailingLister;

    impl NodeLister for FailingLister {
        fn list(&self) -> Result<Vec<Node>> {
            Err(SchedulerError::node_list_failed("informer not synced"))
        }
    }

    #[tokio::test]
    async fn test_node_list_failure_propagates() {
        let scheduler = GenericScheduler::with_defaults(Arc::new(SchedulerCache::default()));
        let err = scheduler
            .schedule(&pod_with_port("foo", 8080), &FailingLister)
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::NodeListFailed { .. }));
        assert_eq!(err.to_string(), "Failed to list nodes: informer not synced");
        assert_eq!(err.reason(), "SchedulerError");
    }

    #[tokio::test]
    async fn test_schedule_skips_occupied_node() {
        let cache = Arc::new(SchedulerCache::default());
        cache.reserve(&pod_with_port("holder", 8080), "machine1").unwrap();
        let scheduler = ports_only(cache);

        let node = scheduler
            .schedule(&pod_with_port("bar", 8080), &lister(&["machine1", "machine2"]))
            .await
            .unwrap();
        assert_eq!(node, "machine2");
    }

    #[tokio::test]
    async fn test_ties_break_by_smallest_node_name() {
        let scheduler = ports_only(Arc::new(SchedulerCache::default()));

        let node = scheduler
            .schedule(
                &pod_with_port("foo", 80),
                &lister(&["machine3", "machine1", "machine2"]),
            )
            .await
            .unwrap();
        assert_eq!(node, "machine1");
    }

    #[tokio::test]
    async fn test_highest_weighted_score_wins() {
        let priorities = vec![PriorityConfig::new(
            "prefer-machine2",
            3,
            |_: &Pod, info: &NodeInfo| {
                if info.node().and_then(|n| n.node_name()) == Some("machine2") {
                    5i64
                } else {
                    1i64
                }
            },
        )];
        let scheduler = GenericScheduler::new(
            Arc::new(SchedulerCache::default()),
            PredicateRegistry::new(),
            priorities,
            Vec::new(),
        );

        let node = scheduler
            .schedule(&pod_with_port("foo", 80), &lister(&["machine1", "machine2"]))
            .await
            .unwrap();
        assert_eq!(node, "machine2");
    }

    #[tokio::test]
    async fn test_extender_filter_and_prioritize() {
        let extender = FixedExtender {
            name: "gpu",
            keep: Some(vec!["machine2", "machine3"]),
            scores: vec![("machine3", 4)],
            weight: 2,
            fail: false,
        };
        let scheduler = GenericScheduler::new(
            Arc::new(SchedulerCache::default()),
            PredicateRegistry::new(),
            Vec::new(),
            vec![Arc::new(extender)],
        );

        let node = scheduler
            .schedule(
                &pod_with_port("foo", 80),
                &lister(&["machine1", "machine2", "machine3"]),
            )
            .await
            .unwrap();
        assert_eq!(node, "machine3");
    }

    #[tokio::test]
    async fn test_extender_filtering_everything_is_fit_error() {
        let extender = FixedExtender {
            name: "gpu",
            keep: Some(vec![]),
            scores: vec![],
            weight: 1,
            fail: false,
        };
        let scheduler = GenericScheduler::new(
            Arc::new(SchedulerCache::default()),
            PredicateRegistry::new(),
            Vec::new(),
            vec![Arc::new(extender)],
        );

        let err = scheduler
            .schedule(&pod_with_port("foo", 80), &lister(&["machine1"]))
            .await
            .unwrap_err();
        match err {
            SchedulerError::FitError {
                failed_predicates, ..
            } => {
                assert_eq!(
                    failed_predicates.get("machine1").map(String::as_str),
                    Some("extender:gpu")
                );
            }
            other => panic!("expected FitError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extender_error_fails_scheduling() {
        let extender = FixedExtender {
            name: "gpu",
            keep: None,
            scores: vec![],
            weight: 1,
            fail: true,
        };
        let scheduler = GenericScheduler::new(
            Arc::new(SchedulerCache::default()),
            PredicateRegistry::new(),
            Vec::new(),
            vec![Arc::new(extender)],
        );

        let err = scheduler
            .schedule(&pod_with_port("foo", 80), &lister(&["machine1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ExtenderFailed { ref extender, .. } if extender == "gpu"));
        assert_eq!(err.reason(), "ExtenderError");
    }

    #[test]
    fn test_select_host_is_order_independent() {
        let forward = vec![
            ScoreResult::new("b", 5),
            ScoreResult::new("a", 5),
            ScoreResult::new("c", 2),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(select_host(&forward).unwrap().node_name, "a");
        assert_eq!(select_host(&reversed).unwrap().node_name, "a");
        assert!(select_host(&[]).is_err());
    }
}
