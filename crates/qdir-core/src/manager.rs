//! The manager: producer registry, queue building, and the global step.
//!
//! # Architecture
//!
//! The `Manager` owns:
//! - every [`Producer`], in a registry keyed by [`ProducerId`]
//! - the evaluation order, re-sorted at the start of every tick
//! - the [`Hooks`] registry of predicates and completion callbacks
//! - an [`EventBus`] for lifecycle events
//!
//! Cross references between producers are ids resolved through the registry
//! at use time. A production holds the id of the producer it will start;
//! the producer it starts does not point back (ask [`Manager::produced_by`]).
//!
//! # Tick Pipeline
//!
//! Each `evaluate(dt)` runs:
//! 1. **Pre-tick** -- apply mutations requested by reactive handlers
//! 2. **Order** -- stable sort: unpaused first, busy before idle, then the
//!    head closest to completion first
//! 3. **Drain** -- evaluate each producer once with the full `dt`
//! 4. **Post-tick** -- bump the tick counter and deliver buffered events

use crate::action::{
    Action, ActionContext, ActionKind, CompoundAction, LockAction, ProduceAction, Timer,
    WaitAction,
};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::event::{
    Event, EventBus, EventKind, EventMutation, PassiveListener, ReactiveHandler, SubscriptionId,
};
use crate::hooks::Hooks;
use crate::id::{ActionId, CallbackId, PredicateId, ProducerId};
use crate::producer::Producer;
use crate::queue::ActionQueue;
use crate::sim::{StateHash, TickReport};
use crate::time::{SimTime, Ticks};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Declarative action description
// ---------------------------------------------------------------------------

/// Describes an action to build. Used for compound steps; the manager
/// assigns ids and creates production targets while building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSpec {
    Wait {
        time: SimTime,
        on_done: Option<CallbackId>,
    },
    Lock {
        predicate: PredicateId,
    },
    Produce {
        time: SimTime,
    },
    Compound(Vec<ActionSpec>),
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Manager {
    pub(crate) producers: BTreeMap<ProducerId, Producer>,

    /// Evaluation order. Sorted stably each tick, so ties keep the order of
    /// the previous tick.
    pub(crate) order: Vec<ProducerId>,

    /// Last producer id handed out. Ids are never reused.
    pub(crate) next_id: u64,

    pub(crate) next_action_id: u64,

    pub(crate) tick: Ticks,

    /// Producers already drained during the current tick.
    pub(crate) evaluated: BTreeSet<ProducerId>,

    pub(crate) hooks: Hooks,

    pub(crate) event_bus: EventBus,

    pub(crate) config: SchedulerConfig,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            producers: BTreeMap::new(),
            order: Vec::new(),
            next_id: 0,
            next_action_id: 0,
            tick: 0,
            evaluated: BTreeSet::new(),
            hooks: Hooks::new(),
            event_bus: EventBus::new(config.event_buffer_capacity),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of ticks run so far.
    pub fn tick(&self) -> Ticks {
        self.tick
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Create and register a producer. Producers are usually created paused
    /// and started by a production.
    pub fn create_producer(&mut self, paused: bool) -> ProducerId {
        self.next_id += 1;
        let id = ProducerId(self.next_id);
        self.producers.insert(id, Producer::new(id, paused));
        self.order.push(id);
        self.emit(Event::ProducerCreated {
            producer: id,
            paused,
            tick: self.tick,
        });
        debug!(producer = %id, paused, "producer created");
        id
    }

    pub fn create_unpaused_producer(&mut self) -> ProducerId {
        self.create_producer(false)
    }

    /// Cancel every queued action of a producer, then unregister it.
    /// Cancelling a pending production removes the producer it would have
    /// started, recursively. Returns false (and logs) if it is not registered.
    pub fn remove_producer(&mut self, id: ProducerId) -> bool {
        let Some(producer) = self.producers.get_mut(&id) else {
            warn!(producer = %id, "remove_producer: producer not found");
            return false;
        };
        let actions = producer.queue.take_all();
        for action in actions {
            self.cancel_detached(id, action);
        }
        self.producers.remove(&id);
        self.order.retain(|p| *p != id);
        self.evaluated.remove(&id);
        self.emit(Event::ProducerRemoved {
            producer: id,
            tick: self.tick,
        });
        debug!(producer = %id, "producer removed");
        true
    }

    pub fn pause(&mut self, id: ProducerId) -> bool {
        self.set_paused(id, true)
    }

    pub fn resume(&mut self, id: ProducerId) -> bool {
        self.set_paused(id, false)
    }

    fn set_paused(&mut self, id: ProducerId, paused: bool) -> bool {
        let Some(producer) = self.producers.get_mut(&id) else {
            warn!(producer = %id, paused, "set_paused: producer not found");
            return false;
        };
        if producer.paused != paused {
            producer.paused = paused;
            let tick = self.tick;
            self.emit(if paused {
                Event::ProducerPaused { producer: id, tick }
            } else {
                Event::ProducerUnpaused { producer: id, tick }
            });
        }
        true
    }

    pub fn producer(&self, id: ProducerId) -> Option<&Producer> {
        self.producers.get(&id)
    }

    pub fn contains(&self, id: ProducerId) -> bool {
        self.producers.contains_key(&id)
    }

    /// All producers, ascending by id.
    pub fn producers(&self) -> impl Iterator<Item = &Producer> {
        self.producers.values()
    }

    pub fn paused_producers(&self) -> impl Iterator<Item = &Producer> {
        self.producers.values().filter(|p| p.paused)
    }

    pub fn unpaused_producers(&self) -> impl Iterator<Item = &Producer> {
        self.producers.values().filter(|p| !p.paused)
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// The order producers were evaluated in during the last tick (new
    /// producers appended at the end).
    pub fn evaluation_order(&self) -> &[ProducerId] {
        &self.order
    }

    /// The pending production that will start `id`, as
    /// `(owning producer, production action)`.
    pub fn produced_by(&self, id: ProducerId) -> Option<(ProducerId, ActionId)> {
        self.producers.values().find_map(|p| {
            p.queue
                .pending_production_of(id)
                .map(|action| (p.id, action))
        })
    }

    /// Progress in `[0, 1]` of a queued action (nested steps included).
    pub fn action_progress(&self, producer: ProducerId, action: ActionId) -> Option<SimTime> {
        let action = self.producers.get(&producer)?.find_action(action)?;
        let hooks = &self.hooks;
        Some(action.progress(&|predicate| hooks.is_open(predicate).ok()))
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Hand the hook registry back, e.g. to revive a snapshot with it.
    pub fn take_hooks(&mut self) -> Hooks {
        std::mem::take(&mut self.hooks)
    }

    /// Register a lock predicate. It must return `true` when the lock is open.
    pub fn register_predicate(&mut self, predicate: impl Fn() -> bool + 'static) -> PredicateId {
        self.hooks.register_predicate(predicate)
    }

    pub fn register_callback(
        &mut self,
        callback: impl FnMut(SimTime) -> Option<SimTime> + 'static,
    ) -> CallbackId {
        self.hooks.register_callback(callback)
    }

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Queue a wait. `on_done` runs with the overflow once the wait finishes.
    pub fn enqueue_wait(
        &mut self,
        producer: ProducerId,
        time: SimTime,
        on_done: Option<CallbackId>,
    ) -> SchedulerResult<ActionId> {
        self.enqueue(producer, ActionSpec::Wait { time, on_done })
    }

    /// Queue a lock that holds the rest of the queue until `predicate` opens.
    pub fn enqueue_lock(
        &mut self,
        producer: ProducerId,
        predicate: PredicateId,
    ) -> SchedulerResult<ActionId> {
        self.enqueue(producer, ActionSpec::Lock { predicate })
    }

    /// Queue a production. Creates the target producer (paused) right away
    /// and returns it, so more work can be queued on it before it starts.
    pub fn enqueue_produce(
        &mut self,
        producer: ProducerId,
        time: SimTime,
    ) -> SchedulerResult<ProducerId> {
        self.check_enqueue(producer, &ActionSpec::Produce { time })?;
        let target = self.create_producer(true);
        let action = self.new_action(ActionKind::Produce(ProduceAction {
            timer: Timer::new(time),
            producing: target,
        }));
        self.push_action(producer, action);
        Ok(target)
    }

    /// Queue a production that only starts counting once `predicate` opens.
    /// Returns the target producer.
    pub fn enqueue_predicated_produce(
        &mut self,
        producer: ProducerId,
        predicate: PredicateId,
        time: SimTime,
    ) -> SchedulerResult<ProducerId> {
        let spec = ActionSpec::Compound(vec![
            ActionSpec::Lock { predicate },
            ActionSpec::Produce { time },
        ]);
        self.check_enqueue(producer, &spec)?;

        let compound_id = self.next_action_id();
        let lock = self.new_action(ActionKind::Lock(LockAction { predicate }));
        let target = self.create_producer(true);
        let produce = self.new_action(ActionKind::Produce(ProduceAction {
            timer: Timer::new(time),
            producing: target,
        }));
        let mut steps = ActionQueue::new();
        steps.push(lock);
        steps.push(produce);
        let compound = Action::new(
            compound_id,
            ActionKind::Compound(CompoundAction { actions: steps }),
        );
        self.push_action(producer, compound);
        Ok(target)
    }

    /// Queue a wait that only starts counting once `predicate` opens.
    pub fn enqueue_predicated_wait(
        &mut self,
        producer: ProducerId,
        predicate: PredicateId,
        time: SimTime,
        on_done: Option<CallbackId>,
    ) -> SchedulerResult<ActionId> {
        self.enqueue(
            producer,
            ActionSpec::Compound(vec![
                ActionSpec::Lock { predicate },
                ActionSpec::Wait { time, on_done },
            ]),
        )
    }

    /// Queue a compound action built from `steps`.
    pub fn enqueue_compound(
        &mut self,
        producer: ProducerId,
        steps: Vec<ActionSpec>,
    ) -> SchedulerResult<ActionId> {
        self.enqueue(producer, ActionSpec::Compound(steps))
    }

    /// Queue any described action. Everything is validated before anything
    /// is created, so a rejected `ActionSpec` leaves the manager untouched.
    pub fn enqueue(&mut self, producer: ProducerId, spec: ActionSpec) -> SchedulerResult<ActionId> {
        self.check_enqueue(producer, &spec)?;
        let action = self.build(spec);
        let id = action.id;
        self.push_action(producer, action);
        Ok(id)
    }

    fn check_enqueue(&self, producer: ProducerId, spec: &ActionSpec) -> SchedulerResult<()> {
        if !self.producers.contains_key(&producer) {
            return Err(SchedulerError::UnknownProducer(producer));
        }
        self.check_spec(spec)
    }

    fn check_spec(&self, spec: &ActionSpec) -> SchedulerResult<()> {
        match spec {
            ActionSpec::Wait { time, on_done } => {
                if *time < SimTime::ZERO {
                    return Err(SchedulerError::NegativeDuration(*time));
                }
                if let Some(callback) = on_done
                    && !self.hooks.has_callback(*callback)
                {
                    return Err(SchedulerError::UnknownCallback(*callback));
                }
                Ok(())
            }
            ActionSpec::Lock { predicate } => {
                if self.hooks.has_predicate(*predicate) {
                    Ok(())
                } else {
                    Err(SchedulerError::UnknownPredicate(*predicate))
                }
            }
            ActionSpec::Produce { time } => {
                if *time < SimTime::ZERO {
                    Err(SchedulerError::NegativeDuration(*time))
                } else {
                    Ok(())
                }
            }
            ActionSpec::Compound(steps) => steps.iter().try_for_each(|s| self.check_spec(s)),
        }
    }

    /// Build an already validated spec. Ids are assigned depth-first, a
    /// compound before its steps.
    fn build(&mut self, spec: ActionSpec) -> Action {
        match spec {
            ActionSpec::Wait { time, on_done } => self.new_action(ActionKind::Wait(WaitAction {
                timer: Timer::new(time),
                on_done,
            })),
            ActionSpec::Lock { predicate } => {
                self.new_action(ActionKind::Lock(LockAction { predicate }))
            }
            ActionSpec::Produce { time } => {
                let target = self.create_producer(true);
                self.new_action(ActionKind::Produce(ProduceAction {
                    timer: Timer::new(time),
                    producing: target,
                }))
            }
            ActionSpec::Compound(steps) => {
                let id = self.next_action_id();
                let mut actions = ActionQueue::new();
                for step in steps {
                    let action = self.build(step);
                    actions.push(action);
                }
                Action::new(id, ActionKind::Compound(CompoundAction { actions }))
            }
        }
    }

    fn next_action_id(&mut self) -> ActionId {
        self.next_action_id += 1;
        ActionId(self.next_action_id)
    }

    fn new_action(&mut self, kind: ActionKind) -> Action {
        let id = self.next_action_id();
        Action::new(id, kind)
    }

    fn push_action(&mut self, producer: ProducerId, action: Action) {
        trace!(producer = %producer, action = %action.id, kind = action.kind.name(), "action queued");
        if let Some(p) = self.producers.get_mut(&producer) {
            p.queue.push(action);
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Splice a queued action out of a producer's queue and cancel it.
    /// Returns false (and logs) if either is missing.
    pub fn cancel_action(&mut self, producer: ProducerId, action: ActionId) -> bool {
        let Some(p) = self.producers.get_mut(&producer) else {
            warn!(producer = %producer, action = %action, "cancel_action: producer not found");
            return false;
        };
        let Some(removed) = p.queue.remove(action) else {
            warn!(producer = %producer, action = %action, "cancel_action: action not found");
            return false;
        };
        self.cancel_detached(producer, removed);
        true
    }

    /// Cancel every queued action of a producer, in queue order. Returns how
    /// many were cancelled.
    pub fn cancel_actions(&mut self, producer: ProducerId) -> usize {
        let Some(p) = self.producers.get_mut(&producer) else {
            warn!(producer = %producer, "cancel_actions: producer not found");
            return 0;
        };
        let actions = p.queue.take_all();
        let count = actions.len();
        for action in actions {
            self.cancel_detached(producer, action);
        }
        count
    }

    /// Run the cancellation hook of an action already removed from its queue.
    fn cancel_detached(&mut self, owner: ProducerId, action: Action) {
        self.emit(Event::ActionCancelled {
            producer: owner,
            action: action.id,
            tick: self.tick,
        });
        if action.finished {
            return;
        }
        match action.kind {
            ActionKind::Produce(produce) => {
                // A target removed earlier is logged by remove_producer.
                self.remove_producer(produce.producing);
            }
            ActionKind::Compound(mut compound) => {
                for inner in compound.actions.take_all() {
                    if !inner.finished {
                        self.cancel_detached(owner, inner);
                    }
                }
            }
            ActionKind::Wait(_) | ActionKind::Lock(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub(crate) fn emit(&mut self, event: Event) {
        self.event_bus.emit(event);
    }

    /// Read access to buffered events and subscriber counts.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) -> SubscriptionId {
        self.event_bus.on_passive(kind, listener)
    }

    pub fn on_reactive(&mut self, kind: EventKind, handler: ReactiveHandler) -> SubscriptionId {
        self.event_bus.on_reactive(kind, handler)
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.event_bus.unsubscribe(subscription)
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    /// Deliver buffered events now. `evaluate` does this after every tick;
    /// call it to flush events from cancellations made between ticks.
    pub fn deliver_events(&mut self) -> usize {
        self.event_bus.deliver()
    }

    fn apply_event_mutations(&mut self) {
        for mutation in self.event_bus.drain_mutations() {
            match mutation {
                EventMutation::CancelAction { producer, action } => {
                    self.cancel_action(producer, action);
                }
                EventMutation::RemoveProducer { producer } => {
                    self.remove_producer(producer);
                }
                EventMutation::Pause { producer } => {
                    self.pause(producer);
                }
                EventMutation::Resume { producer } => {
                    self.resume(producer);
                }
                // Handled by the bus during delivery.
                EventMutation::Unsubscribe { .. } => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Advance the whole scheduler by `dt`.
    pub fn evaluate(&mut self, dt: SimTime) -> SchedulerResult<TickReport> {
        if dt < SimTime::ZERO {
            return Err(SchedulerError::NegativeDelta(dt));
        }

        // Pre-tick.
        self.apply_event_mutations();

        // Order.
        let producers = &self.producers;
        debug_assert!(
            self.order.len() == producers.len()
                && self.order.iter().all(|id| producers.contains_key(id)),
            "evaluation order out of sync with the producer registry"
        );
        self.order
            .sort_by_key(|id| producers.get(id).map(Producer::order_key));

        // Drain.
        self.evaluated.clear();
        let order = self.order.clone();
        for id in order {
            if self.evaluated.contains(&id) || !self.producers.contains_key(&id) {
                continue;
            }
            if let Err(err) = self.drain_producer(id, dt) {
                self.evaluated.clear();
                return Err(err);
            }
        }

        // Post-tick.
        let producers_evaluated = self.evaluated.len();
        self.evaluated.clear();
        let report_tick = self.tick;
        self.tick += 1;
        let events_delivered = self.event_bus.deliver();
        debug!(
            tick = report_tick,
            producers = producers_evaluated,
            events = events_delivered,
            "tick complete"
        );

        Ok(TickReport {
            tick: report_tick,
            producers_evaluated,
            events_delivered,
        })
    }

    /// Drain one producer's queue with `dt`, outside of a global step.
    /// Returns `None` for a paused producer, which consumes nothing and is
    /// left untouched; otherwise the time its queue left unconsumed.
    /// Productions that finish still start their targets.
    pub fn evaluate_producer(
        &mut self,
        id: ProducerId,
        dt: SimTime,
    ) -> SchedulerResult<Option<SimTime>> {
        if dt < SimTime::ZERO {
            return Err(SchedulerError::NegativeDelta(dt));
        }
        self.evaluated.clear();
        let result = self.drain_producer(id, dt);
        self.evaluated.clear();
        result
    }

    /// Drain one producer unless it is paused, marking it evaluated for the
    /// current step.
    fn drain_producer(&mut self, id: ProducerId, dt: SimTime) -> SchedulerResult<Option<SimTime>> {
        let producer = self
            .producers
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownProducer(id))?;
        if producer.paused {
            return Ok(None);
        }
        self.evaluated.insert(id);

        // The queue is taken out while it drains so a production can reach
        // other producers through `self`.
        let mut queue = std::mem::take(&mut producer.queue);
        let result = queue.drain(id, dt, self);
        if let Some(producer) = self.producers.get_mut(&id) {
            producer.queue = queue;
        }
        result.map(Some)
    }

    // -----------------------------------------------------------------------
    // Hashing
    // -----------------------------------------------------------------------

    /// Hash of all scheduler state (hooks and subscribers excluded).
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.next_id);
        h.write_u64(self.next_action_id);
        h.write_u64(self.tick);
        h.write_u64(self.producers.len() as u64);
        for producer in self.producers.values() {
            h.write_u64(producer.id.0);
            h.write_bool(producer.paused);
            hash_queue(&mut h, &producer.queue);
        }
        h.finish()
    }
}

fn hash_queue(h: &mut StateHash, queue: &ActionQueue) {
    h.write_u64(queue.len() as u64);
    for action in queue.iter() {
        h.write_u64(action.id.0);
        h.write_bool(action.started);
        h.write_bool(action.finished);
        match &action.kind {
            ActionKind::Wait(wait) => {
                h.write_u32(0);
                h.write_time(wait.timer.total_time);
                h.write_time(wait.timer.time_left);
                h.write_u32(wait.on_done.map(|c| c.0 + 1).unwrap_or(0));
            }
            ActionKind::Lock(lock) => {
                h.write_u32(1);
                h.write_u32(lock.predicate.0);
            }
            ActionKind::Produce(produce) => {
                h.write_u32(2);
                h.write_time(produce.timer.total_time);
                h.write_time(produce.timer.time_left);
                h.write_u64(produce.producing.0);
            }
            ActionKind::Compound(compound) => {
                h.write_u32(3);
                hash_queue(h, &compound.actions);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Action context
// ---------------------------------------------------------------------------

impl ActionContext for Manager {
    fn cascade_limit(&self) -> u32 {
        self.config.cascade_limit()
    }

    fn predicate_open(&self, predicate: PredicateId) -> SchedulerResult<bool> {
        self.hooks.is_open(predicate)
    }

    fn complete_wait(
        &mut self,
        callback: CallbackId,
        overflow: SimTime,
    ) -> SchedulerResult<Option<SimTime>> {
        self.hooks.complete(callback, overflow)
    }

    fn complete_production(
        &mut self,
        target: ProducerId,
        overflow: SimTime,
    ) -> SchedulerResult<Option<SimTime>> {
        let Some(producer) = self.producers.get_mut(&target) else {
            warn!(producer = %target, "production finished but its target was removed");
            return Ok(None);
        };
        // A target that was already running gets its own full turn from the
        // tick loop; only a freshly started one runs on the overflow.
        if !producer.paused {
            return Ok(None);
        }
        producer.paused = false;
        self.emit(Event::ProducerUnpaused {
            producer: target,
            tick: self.tick,
        });
        if self.evaluated.contains(&target) {
            return Ok(None);
        }
        self.drain_producer(target, overflow)
    }

    fn action_started(&mut self, owner: ProducerId, action: ActionId) {
        trace!(producer = %owner, action = %action, "action started");
        self.emit(Event::ActionStarted {
            producer: owner,
            action,
            tick: self.tick,
        });
    }

    fn action_finished(&mut self, owner: ProducerId, action: ActionId) {
        trace!(producer = %owner, action = %action, "action finished");
        self.emit(Event::ActionFinished {
            producer: owner,
            action,
            tick: self.tick,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{secs, time_from_f64};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn chain(manager: &mut Manager, len: usize) -> Vec<ProducerId> {
        let mut ids = vec![manager.create_unpaused_producer()];
        while ids.len() < len {
            let last = ids[ids.len() - 1];
            ids.push(manager.enqueue_produce(last, secs(1)).unwrap());
        }
        ids
    }

    #[test]
    fn ids_are_one_based_and_never_reused() {
        let mut manager = Manager::new();
        let a = manager.create_producer(true);
        let b = manager.create_producer(true);
        assert_eq!((a, b), (ProducerId(1), ProducerId(2)));
        assert!(manager.remove_producer(b));
        assert_eq!(manager.create_producer(true), ProducerId(3));
    }

    #[test]
    fn enqueue_produce_creates_paused_target() {
        let mut manager = Manager::new();
        let p1 = manager.create_unpaused_producer();
        let p2 = manager.enqueue_produce(p1, secs(1)).unwrap();
        assert_eq!(manager.producer_count(), 2);
        assert!(manager.producer(p2).unwrap().is_paused());
        assert_eq!(manager.produced_by(p2).map(|(owner, _)| owner), Some(p1));

        manager.evaluate(secs(1)).unwrap();
        assert!(!manager.producer(p2).unwrap().is_paused());
        assert_eq!(manager.produced_by(p2), None);
    }

    #[test]
    fn chain_stays_paused_until_produced() {
        let mut manager = Manager::new();
        let ids = chain(&mut manager, 3);
        manager.evaluate(secs(1)).unwrap();
        assert!(!manager.producer(ids[0]).unwrap().is_paused());
        assert!(!manager.producer(ids[1]).unwrap().is_paused());
        assert!(manager.producer(ids[2]).unwrap().is_paused());
    }

    #[test]
    fn chain_overflow_starts_the_next() {
        let mut manager = Manager::new();
        let ids = chain(&mut manager, 3);
        manager.evaluate(secs(2)).unwrap();
        assert!(ids.iter().all(|id| !manager.producer(*id).unwrap().is_paused()));
    }

    #[test]
    fn chain_leftover_continues_next_without_double_evaluation() {
        let mut manager = Manager::new();
        let ids = chain(&mut manager, 3);
        let report = manager.evaluate(time_from_f64(1.5)).unwrap();

        let p2 = manager.producer(ids[1]).unwrap();
        assert!(!p2.is_paused());
        assert_eq!(p2.head().and_then(Action::time_left), Some(time_from_f64(0.5)));
        assert!(manager.producer(ids[2]).unwrap().is_paused());
        assert_eq!(report.producers_evaluated, 2);
    }

    #[test]
    fn paused_producer_evaluates_to_none() {
        let mut manager = Manager::new();
        let p = manager.create_producer(true);
        manager.enqueue_wait(p, secs(1), None).unwrap();
        let before = manager.state_hash();
        assert_eq!(manager.evaluate_producer(p, secs(5)).unwrap(), None);
        assert_eq!(manager.state_hash(), before);
    }

    #[test]
    fn lock_blocks_until_open() {
        let mut manager = Manager::new();
        let p = manager.create_unpaused_producer();
        let open = Rc::new(Cell::new(false));
        let flag = open.clone();
        let predicate = manager.register_predicate(move || flag.get());
        let done = Rc::new(Cell::new(0));
        let counter = done.clone();
        let callback = manager.register_callback(move |_| {
            counter.set(counter.get() + 1);
            None
        });
        manager.enqueue_lock(p, predicate).unwrap();
        manager.enqueue_wait(p, secs(1), Some(callback)).unwrap();

        for _ in 0..3 {
            manager.evaluate(secs(1)).unwrap();
        }
        assert_eq!(done.get(), 0);

        open.set(true);
        manager.evaluate(secs(1)).unwrap();
        manager.evaluate(secs(1)).unwrap();
        assert_eq!(done.get(), 1);
    }

    #[test]
    fn predicated_produce_waits_for_predicate() {
        let mut manager = Manager::new();
        let p = manager.create_unpaused_producer();
        let open = Rc::new(Cell::new(false));
        let flag = open.clone();
        let predicate = manager.register_predicate(move || flag.get());
        let target = manager.enqueue_predicated_produce(p, predicate, secs(1)).unwrap();

        manager.evaluate(secs(2)).unwrap();
        assert_eq!(manager.unpaused_producers().count(), 1);
        assert_eq!(manager.produced_by(target).map(|(owner, _)| owner), Some(p));

        open.set(true);
        manager.evaluate(secs(2)).unwrap();
        assert_eq!(manager.unpaused_producers().count(), 2);
        assert!(manager.producer(p).unwrap().is_idle());
    }

    #[test]
    fn cancelling_pending_production_removes_target() {
        let mut manager = Manager::new();
        let p1 = manager.create_unpaused_producer();
        let p2 = manager.enqueue_produce(p1, secs(5)).unwrap();
        let p3 = manager.enqueue_produce(p2, secs(5)).unwrap();
        let action = manager.producer(p1).unwrap().head().unwrap().id();

        manager.evaluate(secs(1)).unwrap();
        assert!(manager.cancel_action(p1, action));
        assert!(!manager.contains(p2));
        assert!(!manager.contains(p3));
        assert_eq!(manager.producer_count(), 1);
        assert!(!manager.cancel_action(p1, action));
    }

    #[test]
    fn removing_target_of_pending_production_is_tolerated() {
        let mut manager = Manager::new();
        let p1 = manager.create_unpaused_producer();
        let p2 = manager.enqueue_produce(p1, secs(1)).unwrap();
        manager.enqueue_wait(p1, secs(1), None).unwrap();

        assert!(manager.remove_producer(p2));
        let report = manager.evaluate(time_from_f64(1.5)).unwrap();
        assert_eq!(report.producers_evaluated, 1);
        // Overflow passed through to the wait behind the production.
        let head = manager.producer(p1).unwrap().head().unwrap();
        assert_eq!(head.time_left(), Some(time_from_f64(0.5)));
    }

    #[test]
    fn cancel_actions_cancels_in_queue_order() {
        let mut manager = Manager::new();
        let p = manager.create_unpaused_producer();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        manager.on_passive(
            EventKind::ActionCancelled,
            Box::new(move |e| sink.borrow_mut().push(e.action())),
        );
        let a = manager.enqueue_wait(p, secs(1), None).unwrap();
        let b = manager.enqueue_wait(p, secs(1), None).unwrap();

        assert_eq!(manager.cancel_actions(p), 2);
        manager.deliver_events();
        assert_eq!(*log.borrow(), vec![Some(a), Some(b)]);
    }

    #[test]
    fn ordering_prefers_unpaused_busy_and_nearly_done() {
        let mut manager = Manager::new();
        let idle = manager.create_unpaused_producer();
        let slow = manager.create_unpaused_producer();
        let paused = manager.create_producer(true);
        let fast = manager.create_unpaused_producer();
        manager.enqueue_wait(slow, secs(9), None).unwrap();
        manager.enqueue_wait(fast, secs(2), None).unwrap();
        manager.enqueue_wait(paused, secs(1), None).unwrap();

        manager.evaluate(SimTime::ZERO).unwrap();
        assert_eq!(manager.evaluation_order(), &[fast, slow, idle, paused]);
    }

    #[test]
    fn enqueue_validates_before_creating() {
        let mut manager = Manager::new();
        let p = manager.create_unpaused_producer();
        let err = manager.enqueue_compound(
            p,
            vec![
                ActionSpec::Produce { time: secs(1) },
                ActionSpec::Lock {
                    predicate: PredicateId(42),
                },
            ],
        );
        assert!(matches!(err, Err(SchedulerError::UnknownPredicate(PredicateId(42)))));
        assert_eq!(manager.producer_count(), 1);
        assert!(manager.producer(p).unwrap().is_idle());

        assert!(matches!(
            manager.enqueue_wait(ProducerId(99), secs(1), None),
            Err(SchedulerError::UnknownProducer(ProducerId(99)))
        ));
        assert!(matches!(
            manager.enqueue_wait(p, secs(-1), None),
            Err(SchedulerError::NegativeDuration(_))
        ));
    }

    #[test]
    fn negative_delta_rejected() {
        let mut manager = Manager::new();
        assert!(matches!(
            manager.evaluate(secs(-1)),
            Err(SchedulerError::NegativeDelta(_))
        ));
        assert_eq!(manager.tick(), 0);
    }

    #[test]
    fn reactive_removal_applies_next_tick() {
        let mut manager = Manager::new();
        let p1 = manager.create_unpaused_producer();
        let p2 = manager.create_unpaused_producer();
        let wait = manager.enqueue_wait(p1, secs(1), None).unwrap();
        manager.on_reactive(
            EventKind::ActionFinished,
            Box::new(move |e| {
                if e.action() == Some(wait) {
                    vec![EventMutation::RemoveProducer { producer: p2 }]
                } else {
                    vec![]
                }
            }),
        );

        manager.evaluate(secs(1)).unwrap();
        assert!(manager.contains(p2));
        manager.evaluate(secs(1)).unwrap();
        assert!(!manager.contains(p2));
    }

    #[test]
    fn action_progress_reads_nested_steps() {
        let mut manager = Manager::new();
        let p = manager.create_unpaused_producer();
        let predicate = manager.register_predicate(|| true);
        let compound = manager
            .enqueue_predicated_wait(p, predicate, secs(4), None)
            .unwrap();
        assert_eq!(manager.action_progress(p, compound), Some(SimTime::ONE));

        manager.evaluate(secs(1)).unwrap();
        assert_eq!(manager.action_progress(p, compound), Some(time_from_f64(0.25)));
        assert_eq!(manager.action_progress(p, ActionId(999)), None);
    }
}
