//! Corral Scheduler - Pod to node placement
//!
//! This crate provides:
//! - An occupancy cache of confirmed and assumed pods, sharded per node
//! - The filter, rank and select algorithm with pluggable predicates,
//!   priorities and extenders
//! - The sequential scheduling loop (decide, reserve, bind)
//! - A keyed pod FIFO, an event recorder and a watch feeder
//! - In-memory collaborators for tests and simulation

pub mod algorithm;
pub mod cache;
pub mod error;
pub mod filter;
pub mod mock;
pub mod queue;
pub mod recorder;
pub mod scheduler;
pub mod score;
pub mod traits;
pub mod types;
pub mod watch;

// Re-export commonly used types
pub use algorithm::GenericScheduler;
pub use cache::{CacheConfig, SchedulerCache};
pub use error::{Result, SchedulerError};
pub use filter::{default_predicates, FitPredicate, PredicateRegistry};
pub use queue::PodFifo;
pub use recorder::{EventRecorder, EventRecorderConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use score::{default_priorities, PriorityConfig, PriorityFunction};
pub use traits::{
    Binder, ErrorSink, NodeLister, PodConditionUpdater, PodQueue, ScheduleAlgorithm,
    SchedulerExtender,
};
pub use types::{FailedPredicateMap, NodeInfo, ScoreResult};
pub use watch::run_pod_watch;
