use crate::traits::PodQueue;
use crate::Result;
use async_trait::async_trait;
use corral_core::{Pod, PodExt, PodKey};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct FifoState {
    order: VecDeque<PodKey>,
    items: HashMap<PodKey, Pod>,
    closed: bool,
}

/// Keyed first-in first-out queue of pods awaiting placement
///
/// Adding a key that is already queued replaces the stored pod without
/// changing its position. After `close`, `next` drains what is left and
/// then returns `None`.
#[derive(Default)]
pub struct PodFifo {
    state: Mutex<FifoState>,
    notify: Notify,
}

impl PodFifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a pod, replacing any queued pod with the same key
    pub fn add(&self, pod: Pod) -> Result<()> {
        let key = pod.pod_key()?;
        {
            let mut state = self.state.lock();
            if state.items.insert(key.clone(), pod).is_some() {
                debug!("Replaced queued pod {}", key);
            } else {
                debug!("Queued pod {}", key);
                state.order.push_back(key);
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Close the queue; `next` returns `None` once it is drained
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<Pod> {
        let mut state = self.state.lock();
        let key = state.order.pop_front()?;
        state.items.remove(&key)
    }
}

#[async_trait]
impl PodQueue for PodFifo {
    async fn next(&self) -> Option<Pod> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(pod) = self.try_pop() {
                return Some(pod);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }
}
