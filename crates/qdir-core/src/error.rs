//! Scheduler error type.

use crate::id::{CallbackId, PredicateId, ProducerId};
use crate::time::SimTime;

/// Errors raised while building queues or stepping the scheduler.
///
/// These are programming errors: the step that raised one is abandoned and
/// the manager is left in whatever state the step reached.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A single producer's queue kept cascading past the configured bound
    /// within one step.
    #[error("runaway cascade in producer {producer}: exceeded {limit} iterations in one step")]
    RunawayCascade { producer: ProducerId, limit: u32 },

    #[error("unknown producer {0}")]
    UnknownProducer(ProducerId),

    #[error("unknown predicate {0:?}")]
    UnknownPredicate(PredicateId),

    #[error("unknown completion callback {0:?}")]
    UnknownCallback(CallbackId),

    #[error("negative time delta {0}")]
    NegativeDelta(SimTime),

    #[error("negative action duration {0}")]
    NegativeDuration(SimTime),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
