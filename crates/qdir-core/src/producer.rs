//! Producers: independently scheduled action queues.

use crate::action::Action;
use crate::id::{ActionId, ProducerId};
use crate::queue::ActionQueue;
use crate::time::SimTime;

/// A queue of actions plus a paused flag. Owned by the manager; create one
/// with [`crate::manager::Manager::create_producer`].
///
/// A paused producer is skipped entirely: evaluating it consumes no time and
/// touches no state. Producers spawned by a production start paused and are
/// unpaused when that production completes.
#[derive(Debug)]
pub struct Producer {
    pub(crate) id: ProducerId,
    pub(crate) paused: bool,
    pub(crate) queue: ActionQueue,
}

impl Producer {
    pub(crate) fn new(id: ProducerId, paused: bool) -> Self {
        Self {
            id,
            paused,
            queue: ActionQueue::new(),
        }
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The active action.
    pub fn head(&self) -> Option<&Action> {
        self.queue.head()
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn find_action(&self, id: ActionId) -> Option<&Action> {
        self.queue.find(id)
    }

    /// Evaluation order key: unpaused before paused, busy before idle, then
    /// the head closest to completion first.
    pub(crate) fn order_key(&self) -> (bool, bool, SimTime) {
        (self.paused, self.queue.is_empty(), self.queue.head_remaining())
    }
}
