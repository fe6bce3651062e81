//! Registry of game-supplied closures referenced by id from queued actions.
//!
//! Lock predicates and wait completion callbacks are closures, and closures
//! cannot be saved. Actions therefore store a [`PredicateId`] or
//! [`CallbackId`], and the closures live here. After reviving a snapshot the
//! game hands the manager a `Hooks` with the same ids re-registered, the same
//! way event subscribers are re-registered after a load.

use crate::error::{SchedulerError, SchedulerResult};
use crate::id::{CallbackId, PredicateId};
use crate::time::SimTime;
use std::collections::HashMap;

/// A lock predicate. Returns `true` when the lock is open and the queue
/// behind it may proceed.
pub type Predicate = Box<dyn Fn() -> bool>;

/// A wait completion callback. Receives the overflow time left after the
/// wait finished; returning `Some(t)` replaces the overflow handed on to the
/// next queued action.
pub type Completion = Box<dyn FnMut(SimTime) -> Option<SimTime>>;

#[derive(Default)]
pub struct Hooks {
    predicates: HashMap<PredicateId, Predicate>,
    callbacks: HashMap<CallbackId, Completion>,
    next_predicate: u32,
    next_callback: u32,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut predicates: Vec<_> = self.predicates.keys().copied().collect();
        predicates.sort();
        let mut callbacks: Vec<_> = self.callbacks.keys().copied().collect();
        callbacks.sort();
        f.debug_struct("Hooks")
            .field("predicates", &predicates)
            .field("callbacks", &callbacks)
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under the next free id.
    pub fn register_predicate(&mut self, predicate: impl Fn() -> bool + 'static) -> PredicateId {
        let id = PredicateId(self.next_predicate);
        self.insert_predicate(id, predicate);
        id
    }

    /// Register a predicate under a specific id, replacing any previous one.
    /// Used to rebind predicates after a revival.
    pub fn insert_predicate(
        &mut self,
        id: PredicateId,
        predicate: impl Fn() -> bool + 'static,
    ) -> Option<Predicate> {
        if id.0 >= self.next_predicate {
            self.next_predicate = id.0 + 1;
        }
        self.predicates.insert(id, Box::new(predicate))
    }

    /// Register a completion callback under the next free id.
    pub fn register_callback(
        &mut self,
        callback: impl FnMut(SimTime) -> Option<SimTime> + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.insert_callback(id, callback);
        id
    }

    /// Register a completion callback under a specific id, replacing any
    /// previous one.
    pub fn insert_callback(
        &mut self,
        id: CallbackId,
        callback: impl FnMut(SimTime) -> Option<SimTime> + 'static,
    ) -> Option<Completion> {
        if id.0 >= self.next_callback {
            self.next_callback = id.0 + 1;
        }
        self.callbacks.insert(id, Box::new(callback))
    }

    pub fn remove_predicate(&mut self, id: PredicateId) -> Option<Predicate> {
        self.predicates.remove(&id)
    }

    pub fn remove_callback(&mut self, id: CallbackId) -> Option<Completion> {
        self.callbacks.remove(&id)
    }

    pub fn has_predicate(&self, id: PredicateId) -> bool {
        self.predicates.contains_key(&id)
    }

    pub fn has_callback(&self, id: CallbackId) -> bool {
        self.callbacks.contains_key(&id)
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Evaluate a predicate.
    pub fn is_open(&self, id: PredicateId) -> SchedulerResult<bool> {
        self.predicates
            .get(&id)
            .map(|predicate| predicate())
            .ok_or(SchedulerError::UnknownPredicate(id))
    }

    /// Run a completion callback with the overflow of the wait it ends.
    pub fn complete(&mut self, id: CallbackId, overflow: SimTime) -> SchedulerResult<Option<SimTime>> {
        let callback = self
            .callbacks
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownCallback(id))?;
        Ok(callback(overflow))
    }
}
