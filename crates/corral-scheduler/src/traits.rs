use crate::error::{Result, SchedulerError};
use crate::types::ScoreResult;
use async_trait::async_trait;
use corral_core::{Binding, Node, Pod, PodCondition};

/// Source of pods waiting to be scheduled
///
/// `next` blocks until a pod is available and returns `None` once the
/// queue is closed. Pops are destructive.
#[async_trait]
pub trait PodQueue: Send + Sync {
    async fn next(&self) -> Option<Pod>;
}

/// Snapshot read of the candidate nodes
pub trait NodeLister: Send + Sync {
    fn list(&self) -> Result<Vec<Node>>;
}

/// Durable confirmation of a placement
///
/// Success means the store accepted the binding, not that the watch
/// stream has delivered it yet.
#[async_trait]
pub trait Binder: Send + Sync {
    async fn bind(&self, binding: &Binding) -> Result<()>;
}

/// Best-effort status annotation of a pod
#[async_trait]
pub trait PodConditionUpdater: Send + Sync {
    async fn update(&self, pod: &Pod, condition: &PodCondition) -> Result<()>;
}

/// Receives every terminal scheduling failure, typically to requeue with backoff
pub trait ErrorSink: Send + Sync {
    fn report(&self, pod: &Pod, error: &SchedulerError);
}

/// Decides which node a pod should run on
#[async_trait]
pub trait ScheduleAlgorithm: Send + Sync {
    async fn schedule(&self, pod: &Pod, node_lister: &dyn NodeLister) -> Result<String>;
}

/// Out-of-process filter and scorer consulted after the built-in functions
#[async_trait]
pub trait SchedulerExtender: Send + Sync {
    /// Name used in logs and in the failed-predicate map
    fn name(&self) -> &str;

    /// Drop nodes the extender considers infeasible
    async fn filter(&self, _pod: &Pod, nodes: Vec<Node>) -> Result<Vec<Node>> {
        Ok(nodes)
    }

    /// Score nodes; returns per-node scores and the weight applied to them
    async fn prioritize(&self, _pod: &Pod, _nodes: &[Node]) -> Result<(Vec<ScoreResult>, i64)> {
        Ok((Vec::new(), 0))
    }
}
