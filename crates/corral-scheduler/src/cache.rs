use crate::types::NodeInfo;
use crate::{Result, SchedulerError};
use corral_core::{LabelSelector, Pod, PodExt, PodKey};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the scheduler cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an assumed pod may wait for confirmation before it is evicted
    pub assume_ttl: Duration,
    /// Interval between expiry sweeps (defaults to half the TTL)
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            assume_ttl: Duration::from_secs(30),
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(assume_ttl: Duration) -> Self {
        Self {
            assume_ttl,
            sweep_interval: None,
        }
    }

    /// Effective sweep interval, never shorter than one millisecond
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
            .unwrap_or(self.assume_ttl / 2)
            .max(Duration::from_millis(1))
    }
}

/// Where a pod key currently lives and whether it is still assumed
#[derive(Debug, Clone)]
struct PodEntry {
    node_name: String,
    assumed_at: Option<Instant>,
}

/// A pod copy stored in a node shard
#[derive(Debug, Clone)]
struct CachedPod {
    pod: Pod,
    /// `None` once the store confirmed the pod
    assumed_at: Option<Instant>,
}

impl CachedPod {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        match self.assumed_at {
            Some(at) => now.saturating_duration_since(at) <= ttl,
            None => true,
        }
    }
}

type NodeShard = BTreeMap<PodKey, CachedPod>;

/// In-memory view of which pods occupy which nodes
///
/// Holds both pods the store has confirmed and pods the scheduler has
/// assumed ahead of confirmation. Each node has its own shard mutex, so
/// reading one node never contends with another. A key index, touched
/// only by mutations, guarantees at most one entry per pod key.
///
/// Lock order is index, then shard map, then shard. Both the index and
/// the shard are updated while their locks are held, so readers see a
/// reservation completely (with its timestamp) or not at all.
///
/// Reads take only the shard lock of the node they look at. Mutations
/// also hold the global index lock, so writers on different nodes are
/// serialized against each other.
///
/// Removing an absent key is a no-op, never an error. The expiry sweep,
/// the bind-failure rollback and watch deletions all rely on this.
pub struct SchedulerCache {
    config: CacheConfig,
    index: Mutex<HashMap<PodKey, PodEntry>>,
    shards: RwLock<HashMap<String, Arc<Mutex<NodeShard>>>>,
}

impl SchedulerCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            index: Mutex::new(HashMap::new()),
            shards: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn existing_shard(&self, node_name: &str) -> Option<Arc<Mutex<NodeShard>>> {
        self.shards
            .read()
            .get(node_name)
            .cloned()
    }

    fn shard(&self, node_name: &str) -> Arc<Mutex<NodeShard>> {
        if let Some(shard) = self.existing_shard(node_name) {
            return shard;
        }

        self.shards
            .write()
            .entry(node_name.to_string())
            .or_default()
            .clone()
    }

    /// Drop `key` from the shard of `node_name`; caller holds the index lock
    fn remove_from_shard(&self, node_name: &str, key: &PodKey) {
        if let Some(shard) = self.existing_shard(node_name) {
            shard.lock().remove(key);
        }
    }

    /// Reserve `pod` on `node_name` ahead of binding
    ///
    /// Re-reserving the same key refreshes the timestamp and moves the
    /// reservation if the node changed. Fails with `AlreadyBound` if the
    /// store already confirmed the pod.
    pub fn reserve(&self, pod: &Pod, node_name: &str) -> Result<()> {
        let key = pod.pod_key()?;
        let mut assumed = pod.clone();
        assumed.set_assigned_node(Some(node_name.to_string()));

        let mut index = self.index.lock();

        if let Some(entry) = index.get(&key) {
            if entry.assumed_at.is_none() {
                return Err(SchedulerError::already_bound(key, entry.node_name.clone()));
            }
            if entry.node_name != node_name {
                self.remove_from_shard(&entry.node_name, &key);
            }
        }

        let now = Instant::now();
        self.shard(node_name).lock().insert(
            key.clone(),
            CachedPod {
                pod: assumed,
                assumed_at: Some(now),
            },
        );
        index.insert(
            key.clone(),
            PodEntry {
                node_name: node_name.to_string(),
                assumed_at: Some(now),
            },
        );

        debug!("Assumed pod {} on node {}", key, node_name);
        Ok(())
    }

    /// Record that the store confirmed `pod` on its `spec.nodeName`
    ///
    /// Supersedes any reservation for the same key regardless of node.
    /// Returns `false` when the confirmed record was already identical.
    pub fn confirm(&self, pod: &Pod) -> Result<bool> {
        let key = pod.pod_key()?;
        let node_name = pod
            .assigned_node()
            .ok_or_else(|| {
                SchedulerError::invalid_pod(format!("Confirmed pod {} has no spec.nodeName", key))
            })?
            .to_string();

        let mut index = self.index.lock();

        if let Some(entry) = index.get(&key) {
            if entry.node_name != node_name {
                self.remove_from_shard(&entry.node_name, &key);
            } else if entry.assumed_at.is_none() {
                let shard = self.shard(&node_name);
                let mut shard = shard.lock();
                if shard.get(&key).is_some_and(|cached| cached.pod == *pod) {
                    return Ok(false);
                }
                shard.insert(
                    key.clone(),
                    CachedPod {
                        pod: pod.clone(),
                        assumed_at: None,
                    },
                );
                debug!("Updated confirmed pod {} on node {}", key, node_name);
                return Ok(true);
            } else {
                debug!("Assumed pod {} confirmed on node {}", key, node_name);
            }
        }

        self.shard(&node_name).lock().insert(
            key.clone(),
            CachedPod {
                pod: pod.clone(),
                assumed_at: None,
            },
        );
        index.insert(
            key,
            PodEntry {
                node_name,
                assumed_at: None,
            },
        );

        Ok(true)
    }

    /// Remove every trace of `pod`; absent keys are a no-op
    pub fn remove(&self, pod: &Pod) -> Result<bool> {
        let key = pod.pod_key()?;
        Ok(self.remove_key(&key))
    }

    /// Remove confirmed or assumed state for `key`; returns whether anything was removed
    pub fn remove_key(&self, key: &PodKey) -> bool {
        let mut index = self.index.lock();
        match index.remove(key) {
            Some(entry) => {
                self.remove_from_shard(&entry.node_name, key);
                debug!("Removed pod {} from node {}", key, entry.node_name);
                true
            }
            None => false,
        }
    }

    /// Undo a reservation after a failed bind
    ///
    /// Only a still-assumed entry is dropped. If the store confirmed the pod
    /// in the meantime, the confirmation wins and this is a no-op.
    pub fn forget(&self, pod: &Pod) -> Result<bool> {
        let key = pod.pod_key()?;
        let mut index = self.index.lock();

        let node_name = match index.get(&key) {
            Some(entry) if entry.assumed_at.is_some() => entry.node_name.clone(),
            Some(_) => {
                debug!("Not forgetting pod {}: already confirmed", key);
                return Ok(false);
            }
            None => return Ok(false),
        };

        index.remove(&key);
        self.remove_from_shard(&node_name, &key);
        debug!("Forgot assumed pod {} on node {}", key, node_name);
        Ok(true)
    }

    /// Whether `key` is currently held as an assumed reservation
    pub fn is_assumed(&self, key: &PodKey) -> bool {
        self.index.lock()
            .get(key)
            .is_some_and(|entry| entry.assumed_at.is_some())
    }

    /// Number of pod keys tracked, expired reservations included until swept
    pub fn pod_count(&self) -> usize {
        self.index.lock().len()
    }

    /// Names of nodes that have held pods, sorted
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shards
            .read()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Confirmed and live assumed pods on one node
    pub fn node_view(&self, node_name: &str) -> NodeInfo {
        let Some(shard) = self.existing_shard(node_name) else {
            return NodeInfo::default();
        };

        let now = Instant::now();
        let ttl = self.config.assume_ttl;
        let shard = shard.lock();
        NodeInfo::new(
            shard
                .values()
                .filter(|cached| cached.is_live(now, ttl))
                .map(|cached| cached.pod.clone()),
        )
    }

    /// Confirmed and live assumed pods across all nodes matching `selector`
    ///
    /// Each node is read consistently; nodes are read one after another.
    /// A pod moved between nodes while the snapshot runs can appear twice,
    /// once under its old node and once under its new one.
    pub fn snapshot(&self, selector: &LabelSelector) -> Vec<Pod> {
        let mut shards: Vec<(String, Arc<Mutex<NodeShard>>)> = self
            .shards
            .read()
            .iter()
            .map(|(name, shard)| (name.clone(), shard.clone()))
            .collect();
        shards.sort_by(|a, b| a.0.cmp(&b.0));

        let now = Instant::now();
        let ttl = self.config.assume_ttl;
        let mut pods = Vec::new();

        for (_, shard) in shards {
            let shard = shard.lock();
            pods.extend(
                shard
                    .values()
                    .filter(|cached| cached.is_live(now, ttl))
                    .filter(|cached| selector.matches(cached.pod.metadata.labels.as_ref()))
                    .map(|cached| cached.pod.clone()),
            );
        }

        pods
    }

    /// Evict assumed pods older than the TTL as of `now`
    ///
    /// Confirmed pods are never touched. Returns the evicted keys.
    pub fn cleanup_expired_at(&self, now: Instant) -> Vec<PodKey> {
        let ttl = self.config.assume_ttl;
        let mut index = self.index.lock();

        let expired: Vec<(PodKey, String)> = index
            .iter()
            .filter(|(_, entry)| {
                entry
                    .assumed_at
                    .is_some_and(|at| now.saturating_duration_since(at) > ttl)
            })
            .map(|(key, entry)| (key.clone(), entry.node_name.clone()))
            .collect();

        for (key, node_name) in &expired {
            index.remove(key);
            self.remove_from_shard(node_name, key);
            debug!(
                "Assumed pod {} on node {} expired after {:?}",
                key, node_name, ttl
            );
        }

        expired.into_iter().map(|(key, _)| key).collect()
    }

    /// Evict assumed pods older than the TTL
    pub fn cleanup_expired(&self) -> Vec<PodKey> {
        self.cleanup_expired_at(Instant::now())
    }

    /// Run the expiry sweep until the token is cancelled
    pub async fn run_sweeper(&self, token: CancellationToken) {
        let period = self.config.sweep_interval();
        info!(
            "Starting assumed pod sweeper (ttl: {:?}, interval: {:?})",
            self.config.assume_ttl, period
        );

        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately and nothing can have expired yet
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Assumed pod sweeper shutting down");
                    return;
                }
                _ = interval.tick() => {
                    let expired = self.cleanup_expired();
                    if !expired.is_empty() {
                        debug!("Sweeper evicted {} assumed pods", expired.len());
                    }
                }
            }
        }
    }
}

impl Default for SchedulerCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
