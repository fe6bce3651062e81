//! FIFO action queue and the head-draining algorithm shared by producers and
//! compound actions.

use crate::action::{Action, ActionContext, ActionKind};
use crate::error::{SchedulerError, SchedulerResult};
use crate::id::{ActionId, ProducerId};
use crate::time::SimTime;
use std::collections::VecDeque;

/// Ordered actions; the head is the active one.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn head(&self) -> Option<&Action> {
        self.actions.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Find a queued action by id, including steps nested in compounds.
    pub fn find(&self, id: ActionId) -> Option<&Action> {
        self.actions.iter().find_map(|action| action.find(id))
    }

    /// Whether a top-level action with this id is queued.
    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.iter().any(|action| action.id == id)
    }

    /// Splice out a top-level action.
    pub(crate) fn remove(&mut self, id: ActionId) -> Option<Action> {
        let pos = self.actions.iter().position(|action| action.id == id)?;
        self.actions.remove(pos)
    }

    /// Empty the queue, returning the actions in queue order.
    pub(crate) fn take_all(&mut self) -> Vec<Action> {
        self.actions.drain(..).collect()
    }

    /// Remaining time of the head action; zero for an empty queue.
    pub fn head_remaining(&self) -> SimTime {
        self.actions
            .front()
            .map(Action::remaining_time)
            .unwrap_or(SimTime::ZERO)
    }

    /// The unfinished production in this queue (or nested in a compound)
    /// that will start `target`, if any.
    pub fn pending_production_of(&self, target: ProducerId) -> Option<ActionId> {
        self.actions.iter().find_map(|action| match &action.kind {
            ActionKind::Produce(produce) if produce.producing == target && !action.finished => {
                Some(action.id)
            }
            ActionKind::Compound(compound) => compound.actions.pending_production_of(target),
            _ => None,
        })
    }

    /// Offer `dt` to the head and keep cascading while time is left or the
    /// head just finished.
    ///
    /// - A finished head is evicted before the next action runs in the same
    ///   step.
    /// - Leftover time flows straight to the next action, so several short
    ///   actions can complete in one call.
    /// - A closed lock (or a partially run wait) returns zero without
    ///   finishing, which halts the cascade and holds the rest of the queue.
    ///
    /// Each head evaluation and each eviction counts as one iteration.
    /// Exceeding the context's bound is a runaway cascade.
    pub(crate) fn drain<C: ActionContext + ?Sized>(
        &mut self,
        owner: ProducerId,
        mut dt: SimTime,
        ctx: &mut C,
    ) -> SchedulerResult<SimTime> {
        let limit = ctx.cascade_limit();
        let mut budget = limit;
        loop {
            let Some(head) = self.actions.front_mut() else {
                return Ok(dt);
            };
            if budget == 0 {
                return Err(SchedulerError::RunawayCascade {
                    producer: owner,
                    limit,
                });
            }
            budget -= 1;
            if head.finished {
                self.actions.pop_front();
            } else {
                dt = head.evaluate(owner, dt, ctx)?;
                if dt <= SimTime::ZERO && !head.finished {
                    return Ok(dt);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::{StubContext, lock, wait};
    use crate::id::{CallbackId, PredicateId};
    use crate::time::{secs, time_from_f64};

    const OWNER: ProducerId = ProducerId(1);

    #[test]
    fn empty_queue_returns_dt() {
        let mut ctx = StubContext::new();
        let mut queue = ActionQueue::new();
        assert_eq!(queue.drain(OWNER, secs(3), &mut ctx).unwrap(), secs(3));
    }

    #[test]
    fn leftover_cascades_through_short_actions() {
        let mut ctx = StubContext::new();
        let mut queue = ActionQueue::new();
        queue.push(wait(1, time_from_f64(0.5), None));
        queue.push(wait(2, time_from_f64(0.5), None));
        queue.push(wait(3, secs(2), None));

        let rest = queue.drain(OWNER, secs(2), &mut ctx).unwrap();
        assert_eq!(rest, SimTime::ZERO);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head().and_then(Action::time_left), Some(secs(1)));
        assert_eq!(ctx.finished, vec![ActionId(1), ActionId(2)]);
    }

    #[test]
    fn finished_tail_is_evicted_in_same_step() {
        let mut ctx = StubContext::new();
        let mut queue = ActionQueue::new();
        queue.push(wait(1, secs(1), None));
        let rest = queue.drain(OWNER, secs(3), &mut ctx).unwrap();
        assert_eq!(rest, secs(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_lock_holds_the_rest() {
        let mut ctx = StubContext::new();
        ctx.open.insert(PredicateId(0), false);
        let mut queue = ActionQueue::new();
        queue.push(lock(1, 0));
        queue.push(wait(2, secs(1), Some(CallbackId(0))));

        for _ in 0..5 {
            assert_eq!(queue.drain(OWNER, secs(1), &mut ctx).unwrap(), SimTime::ZERO);
        }
        assert!(ctx.completed.is_empty());
        assert_eq!(queue.len(), 2);

        ctx.open.insert(PredicateId(0), true);
        queue.drain(OWNER, secs(1), &mut ctx).unwrap();
        assert_eq!(ctx.completed.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_duration_chain_past_bound_is_runaway() {
        let mut ctx = StubContext::new();
        ctx.limit = 10;
        let mut queue = ActionQueue::new();
        for i in 0..20 {
            queue.push(wait(i, SimTime::ZERO, None));
        }
        assert!(matches!(
            queue.drain(OWNER, secs(1), &mut ctx),
            Err(SchedulerError::RunawayCascade {
                producer: OWNER,
                limit: 10
            })
        ));
    }

    #[test]
    fn chain_within_bound_completes() {
        let mut ctx = StubContext::new();
        ctx.limit = 10;
        let mut queue = ActionQueue::new();
        for i in 0..4 {
            queue.push(wait(i, SimTime::ZERO, None));
        }
        // 4 evaluations + 4 evictions, then the empty check returns.
        assert_eq!(queue.drain(OWNER, secs(1), &mut ctx).unwrap(), secs(1));
    }

    #[test]
    fn chain_using_whole_bound_completes() {
        let mut ctx = StubContext::new();
        ctx.limit = 10;
        let mut queue = ActionQueue::new();
        for i in 0..5 {
            queue.push(wait(i, SimTime::ZERO, None));
        }
        assert_eq!(queue.drain(OWNER, secs(1), &mut ctx).unwrap(), secs(1));
        assert!(queue.is_empty());

        for i in 5..11 {
            queue.push(wait(i, SimTime::ZERO, None));
        }
        assert!(queue.drain(OWNER, secs(1), &mut ctx).is_err());
    }

    #[test]
    fn remove_and_find() {
        let mut queue = ActionQueue::new();
        queue.push(wait(1, secs(1), None));
        queue.push(lock(2, 0));
        assert!(queue.contains(ActionId(2)));
        assert_eq!(queue.remove(ActionId(2)).map(|a| a.id()), Some(ActionId(2)));
        assert!(queue.remove(ActionId(2)).is_none());
        assert!(queue.find(ActionId(1)).is_some());
        assert_eq!(queue.head_remaining(), secs(1));
    }
}
