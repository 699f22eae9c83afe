use corral_core::{Node, NodeExt, Pod, PodExt, ResourceQuantities};
use std::collections::{BTreeMap, BTreeSet};

/// Node name -> name of the first predicate that rejected the pod there
pub type FailedPredicateMap = BTreeMap<String, String>;

/// Occupancy of a single node as seen by predicates and priorities
///
/// Built from the cache's confirmed and live assumed pods for the node,
/// plus the node object from the lister when the algorithm attaches it.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    node: Option<Node>,
    pods: Vec<Pod>,
    requested: ResourceQuantities,
    used_ports: BTreeSet<i32>,
}

impl NodeInfo {
    /// Create a view over the given pods
    pub fn new(pods: impl IntoIterator<Item = Pod>) -> Self {
        let mut info = Self::default();
        for pod in pods {
            info.add_pod(pod);
        }
        info
    }

    /// Attach the node object
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    fn add_pod(&mut self, pod: Pod) {
        self.requested += pod.requested_resources();
        self.used_ports.extend(pod.host_ports());
        self.pods.push(pod);
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Pods occupying the node
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Sum of the occupants' resource requests
    pub fn requested(&self) -> ResourceQuantities {
        self.requested
    }

    /// Host ports held by the occupants
    pub fn used_ports(&self) -> &BTreeSet<i32> {
        &self.used_ports
    }

    /// Allocatable capacity of the attached node, if it reports any
    pub fn allocatable(&self) -> Option<ResourceQuantities> {
        self.node.as_ref().and_then(|n| n.allocatable())
    }
}

/// Result of scoring a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreResult {
    /// Node name
    pub node_name: String,
    /// Combined score, higher is better
    pub score: i64,
}

impl ScoreResult {
    /// Create a new score result
    pub fn new(node_name: impl Into<String>, score: i64) -> Self {
        Self {
            node_name: node_name.into(),
            score,
        }
    }
}
