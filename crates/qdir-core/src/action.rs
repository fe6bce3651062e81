//! Queued actions and their per-step evaluation.
//!
//! An [`Action`] is one unit of queued work. Every kind shares the same
//! contract: `evaluate(dt)` does as much work as it can with `dt` and returns
//! the unconsumed remainder, which the owning queue immediately offers to the
//! next action (a *cascade*).
//!
//! | Kind       | Consumes          | Finishes when                               |
//! |------------|-------------------|---------------------------------------------|
//! | `Wait`     | up to `time_left` | `time_left` reaches zero                    |
//! | `Lock`     | nothing           | its predicate reports the lock open         |
//! | `Produce`  | up to `time_left` | as `Wait`; then starts the target producer  |
//! | `Compound` | what its steps do | its inner queue is empty                    |
//!
//! Actions never reach into the manager directly. Everything outside the
//! action itself (predicates, callbacks, other producers, events) goes
//! through [`ActionContext`].

use crate::error::SchedulerResult;
use crate::id::{ActionId, CallbackId, PredicateId, ProducerId};
use crate::queue::ActionQueue;
use crate::time::{SimTime, ratio};

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// Services an action needs from its surroundings while it is evaluated.
pub(crate) trait ActionContext {
    /// Bound on draining iterations per queue per step.
    fn cascade_limit(&self) -> u32;

    /// Whether the lock guarded by `predicate` is open.
    fn predicate_open(&self, predicate: PredicateId) -> SchedulerResult<bool>;

    /// Run a wait's completion callback.
    fn complete_wait(
        &mut self,
        callback: CallbackId,
        overflow: SimTime,
    ) -> SchedulerResult<Option<SimTime>>;

    /// Unpause `target` and let it run with `overflow`. Returns what the
    /// target left unconsumed, or `None` to pass `overflow` on unchanged.
    fn complete_production(
        &mut self,
        target: ProducerId,
        overflow: SimTime,
    ) -> SchedulerResult<Option<SimTime>>;

    fn action_started(&mut self, owner: ProducerId, action: ActionId);

    fn action_finished(&mut self, owner: ProducerId, action: ActionId);
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Countdown shared by waits and productions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub(crate) total_time: SimTime,
    pub(crate) time_left: SimTime,
}

impl Timer {
    pub fn new(total_time: SimTime) -> Self {
        Self {
            total_time,
            time_left: total_time,
        }
    }

    pub fn total_time(&self) -> SimTime {
        self.total_time
    }

    pub fn time_left(&self) -> SimTime {
        self.time_left
    }

    /// Count down by `dt`. Returns the overflow once the timer runs out.
    fn advance(&mut self, dt: SimTime) -> Option<SimTime> {
        if self.time_left > dt {
            self.time_left -= dt;
            None
        } else {
            let overflow = dt - self.time_left;
            self.time_left = SimTime::ZERO;
            Some(overflow)
        }
    }

    fn progress(&self) -> SimTime {
        ratio(self.total_time - self.time_left, self.total_time)
    }
}

// ---------------------------------------------------------------------------
// Action kinds
// ---------------------------------------------------------------------------

/// Waits a fixed duration, then runs an optional completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitAction {
    pub(crate) timer: Timer,
    pub(crate) on_done: Option<CallbackId>,
}

/// Blocks its queue, consuming nothing, until the predicate opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAction {
    pub(crate) predicate: PredicateId,
}

/// Waits a fixed duration, then unpauses and starts another producer.
///
/// `producing` is a non-owning reference: the target lives in the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceAction {
    pub(crate) timer: Timer,
    pub(crate) producing: ProducerId,
}

/// A sequence of actions that occupies one slot in its producer's queue.
#[derive(Debug)]
pub struct CompoundAction {
    pub(crate) actions: ActionQueue,
}

impl WaitAction {
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn on_done(&self) -> Option<CallbackId> {
        self.on_done
    }
}

impl LockAction {
    pub fn predicate(&self) -> PredicateId {
        self.predicate
    }
}

impl ProduceAction {
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn producing(&self) -> ProducerId {
        self.producing
    }
}

impl CompoundAction {
    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }
}

#[derive(Debug)]
pub enum ActionKind {
    Wait(WaitAction),
    Lock(LockAction),
    Produce(ProduceAction),
    Compound(CompoundAction),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Wait(_) => "Wait",
            ActionKind::Lock(_) => "Lock",
            ActionKind::Produce(_) => "Produce",
            ActionKind::Compound(_) => "Compound",
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Action {
    pub(crate) id: ActionId,
    pub(crate) started: bool,
    pub(crate) finished: bool,
    pub(crate) kind: ActionKind,
}

impl Action {
    pub(crate) fn new(id: ActionId, kind: ActionKind) -> Self {
        Self {
            id,
            started: false,
            finished: false,
            kind,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Time left on the countdown, for waits and productions.
    pub fn time_left(&self) -> Option<SimTime> {
        match &self.kind {
            ActionKind::Wait(wait) => Some(wait.timer.time_left),
            ActionKind::Produce(produce) => Some(produce.timer.time_left),
            ActionKind::Lock(_) | ActionKind::Compound(_) => None,
        }
    }

    /// The producer this action starts, for productions.
    pub fn producing(&self) -> Option<ProducerId> {
        match &self.kind {
            ActionKind::Produce(produce) => Some(produce.producing),
            _ => None,
        }
    }

    /// Time this action still needs to run, ignoring locks. Used to order
    /// producers within a tick.
    pub fn remaining_time(&self) -> SimTime {
        match &self.kind {
            ActionKind::Wait(wait) => wait.timer.time_left,
            ActionKind::Produce(produce) => produce.timer.time_left,
            ActionKind::Lock(_) => SimTime::ZERO,
            ActionKind::Compound(compound) => compound
                .actions
                .iter()
                .fold(SimTime::ZERO, |acc, a| acc.saturating_add(a.remaining_time())),
        }
    }

    /// Completion in `[0, 1]`, for display. `predicate_open` answers for
    /// locks; an unknown predicate reads as closed.
    pub fn progress(&self, predicate_open: &dyn Fn(PredicateId) -> Option<bool>) -> SimTime {
        if self.finished {
            return SimTime::ONE;
        }
        match &self.kind {
            ActionKind::Wait(wait) => wait.timer.progress(),
            ActionKind::Produce(produce) => produce.timer.progress(),
            ActionKind::Lock(lock) => {
                if predicate_open(lock.predicate).unwrap_or(false) {
                    SimTime::ONE
                } else {
                    SimTime::ZERO
                }
            }
            ActionKind::Compound(compound) => compound
                .actions
                .iter()
                .find(|a| !a.finished)
                .map(|a| a.progress(predicate_open))
                .unwrap_or(SimTime::ZERO),
        }
    }

    /// Find this action or one nested inside it.
    pub fn find(&self, id: ActionId) -> Option<&Action> {
        if self.id == id {
            return Some(self);
        }
        match &self.kind {
            ActionKind::Compound(compound) => compound.actions.find(id),
            _ => None,
        }
    }

    /// Advance this action by `dt` on behalf of `owner`. Returns the part of
    /// `dt` left unconsumed; an already finished action returns `dt` as is.
    pub(crate) fn evaluate<C: ActionContext + ?Sized>(
        &mut self,
        owner: ProducerId,
        dt: SimTime,
        ctx: &mut C,
    ) -> SchedulerResult<SimTime> {
        if self.finished {
            return Ok(dt);
        }
        if !self.started {
            self.started = true;
            ctx.action_started(owner, self.id);
        }

        let rest = match &mut self.kind {
            ActionKind::Wait(wait) => match wait.timer.advance(dt) {
                None => SimTime::ZERO,
                Some(overflow) => {
                    self.finished = true;
                    ctx.action_finished(owner, self.id);
                    match wait.on_done {
                        Some(callback) => ctx.complete_wait(callback, overflow)?.unwrap_or(overflow),
                        None => overflow,
                    }
                }
            },
            ActionKind::Produce(produce) => match produce.timer.advance(dt) {
                None => SimTime::ZERO,
                Some(overflow) => {
                    self.finished = true;
                    ctx.action_finished(owner, self.id);
                    ctx.complete_production(produce.producing, overflow)?
                        .unwrap_or(overflow)
                }
            },
            ActionKind::Lock(lock) => {
                if ctx.predicate_open(lock.predicate)? {
                    self.finished = true;
                    ctx.action_finished(owner, self.id);
                    dt
                } else {
                    SimTime::ZERO
                }
            }
            ActionKind::Compound(compound) => {
                let rest = compound.actions.drain(owner, dt, ctx)?;
                if compound.actions.is_empty() {
                    self.finished = true;
                    ctx.action_finished(owner, self.id);
                }
                rest
            }
        };
        Ok(rest)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
