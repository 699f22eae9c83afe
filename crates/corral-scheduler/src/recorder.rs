use corral_core::{EventType, SchedulingEvent};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Configuration for the event recorder
#[derive(Debug, Clone)]
pub struct EventRecorderConfig {
    /// Capacity of the broadcast channel
    pub capacity: usize,
}

impl Default for EventRecorderConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Fans scheduling events out to any number of subscribers
///
/// Recording never blocks. Events sent while nobody is subscribed are
/// dropped, and slow subscribers observe a lag instead of stalling the loop.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: broadcast::Sender<SchedulingEvent>,
}

impl EventRecorder {
    pub fn new(config: EventRecorderConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulingEvent> {
        self.tx.subscribe()
    }

    /// Log the event and publish it
    pub fn record(&self, event: SchedulingEvent) {
        match event.event_type {
            EventType::Normal => info!("{}: {}", event.reason, event.message),
            EventType::Warning => warn!("{}: {}", event.reason, event.message.replace('\n', "; ")),
        }
        // An error only means there are no subscribers
        let _ = self.tx.send(event);
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(EventRecorderConfig::default())
    }
}
