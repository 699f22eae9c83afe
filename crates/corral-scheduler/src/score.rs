use crate::types::{NodeInfo, ScoreResult};
use corral_core::{Pod, PodExt};
use std::sync::Arc;
use tracing::debug;

/// Highest score a built-in priority function hands out
pub const MAX_PRIORITY: i64 = 10;

/// Scoring function for ranking feasible nodes
pub trait PriorityFunction: Send + Sync {
    /// Score a node for the given pod (0-10, higher is better)
    fn score(&self, pod: &Pod, node: &NodeInfo) -> i64;
}

impl<F> PriorityFunction for F
where
    F: Fn(&Pod, &NodeInfo) -> i64 + Send + Sync,
{
    fn score(&self, pod: &Pod, node: &NodeInfo) -> i64 {
        self(pod, node)
    }
}

/// A named priority function and its weight
#[derive(Clone)]
pub struct PriorityConfig {
    pub name: String,
    pub weight: i64,
    pub function: Arc<dyn PriorityFunction>,
}

impl PriorityConfig {
    pub fn new(name: impl Into<String>, weight: i64, function: impl PriorityFunction + 'static) -> Self {
        Self {
            name: name.into(),
            weight,
            function: Arc::new(function),
        }
    }
}

/// Utilization fractions after adding `pod` to the node, if capacity is known
fn fractions_after(pod: &Pod, node: &NodeInfo) -> Option<(f64, f64)> {
    let capacity = node.allocatable()?;
    let total = node.requested() + pod.requested_resources();

    let fraction = |used: i64, cap: i64| {
        if cap > 0 {
            used as f64 / cap as f64
        } else {
            1.0
        }
    };

    Some((
        fraction(total.cpu_millicores, capacity.cpu_millicores),
        fraction(total.memory_bytes, capacity.memory_bytes),
    ))
}

/// Prefers nodes with the most capacity left after placing the pod
pub struct LeastRequestedPriority;

impl LeastRequestedPriority {
    pub const NAME: &'static str = "LeastRequestedPriority";
}

impl PriorityFunction for LeastRequestedPriority {
    fn score(&self, pod: &Pod, node: &NodeInfo) -> i64 {
        let Some((cpu, memory)) = fractions_after(pod, node) else {
            return 0;
        };

        let free = |fraction: f64| ((1.0 - fraction) * MAX_PRIORITY as f64).clamp(0.0, MAX_PRIORITY as f64);
        let score = ((free(cpu) + free(memory)) / 2.0) as i64;

        debug!(
            "Least requested score {} (CPU util: {:.1}%, Memory util: {:.1}%)",
            score,
            cpu * 100.0,
            memory * 100.0
        );

        score
    }
}

/// Prefers nodes whose CPU and memory utilization stay close to each other
pub struct BalancedResourceAllocation;

impl BalancedResourceAllocation {
    pub const NAME: &'static str = "BalancedResourceAllocation";
}

impl PriorityFunction for BalancedResourceAllocation {
    fn score(&self, pod: &Pod, node: &NodeInfo) -> i64 {
        let Some((cpu, memory)) = fractions_after(pod, node) else {
            return 0;
        };

        if cpu >= 1.0 || memory >= 1.0 {
            return 0;
        }

        let variance = (cpu - memory).abs();
        let score = ((1.0 - variance) * MAX_PRIORITY as f64).clamp(0.0, MAX_PRIORITY as f64) as i64;

        debug!("Balanced allocation score {} (variance: {:.3})", score, variance);

        score
    }
}

/// Get default scoring functions
pub fn default_priorities() -> Vec<PriorityConfig> {
    vec![
        PriorityConfig::new(LeastRequestedPriority::NAME, 1, LeastRequestedPriority),
        PriorityConfig::new(BalancedResourceAllocation::NAME, 1, BalancedResourceAllocation),
    ]
}

/// Combine the weighted priorities into one score per node
///
/// With no priorities configured every node scores 1.
pub fn prioritize_nodes(
    pod: &Pod,
    nodes: &[(String, NodeInfo)],
    priorities: &[PriorityConfig],
) -> Vec<ScoreResult> {
    nodes
        .iter()
        .map(|(name, info)| {
            if priorities.is_empty() {
                return ScoreResult::new(name.clone(), 1);
            }

            let score = priorities
                .iter()
                .map(|p| p.weight.saturating_mul(p.function.score(pod, info)))
                .fold(0i64, i64::saturating_add);
            ScoreResult::new(name.clone(), score)
        })
        .collect()
}
