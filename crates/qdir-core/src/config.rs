//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Bound on head-draining iterations a single queue may run in one step.
pub const DEFAULT_MAX_CASCADE_ITERATIONS: u32 = 200;

/// Default number of events reserved per kind for one step.
pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 1024;

/// Tunables for a [`crate::manager::Manager`]. Missing fields take their
/// defaults when deserialized, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum iterations of the draining loop per queue per step. Exceeding
    /// it raises [`crate::error::SchedulerError::RunawayCascade`]. Zero is
    /// treated as one.
    pub max_cascade_iterations: u32,

    /// Events reserved up front in each per-kind outbox. A step that emits
    /// more grows the outbox; no event is dropped.
    pub event_buffer_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_cascade_iterations: DEFAULT_MAX_CASCADE_ITERATIONS,
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// The effective cascade bound (never zero).
    pub fn cascade_limit(&self) -> u32 {
        self.max_cascade_iterations.max(1)
    }
}
